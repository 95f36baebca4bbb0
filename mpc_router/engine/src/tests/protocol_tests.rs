use test_case::test_case;
use zeroize::Zeroizing;

use crate::error::{EngineError, RouterError};
use crate::protocol::{Curve, FanOut, ProtocolKind, ProtocolParams, Role, TerminalOutput};
use crate::round_engine::ffi_party_id;
use crate::tests::parties;
use crate::types::PartyId;

#[test_case(ProtocolKind::DistributedKeyGen, 3, FanOut::Broadcast, TerminalOutput::KeyShare)]
#[test_case(ProtocolKind::KeyRefresh, 3, FanOut::Broadcast, TerminalOutput::RefreshedKeyShare)]
#[test_case(ProtocolKind::Ed25519ThresholdSign, 3, FanOut::Broadcast, TerminalOutput::Signature)]
#[test_case(ProtocolKind::EcdsaTwoPartySign, 5, FanOut::Pairwise, TerminalOutput::Signature)]
fn test_descriptor_table(kind: ProtocolKind, rounds: u32, fan_out: FanOut, output: TerminalOutput) {
    let d = kind.descriptor();
    assert_eq!(d.kind, kind);
    assert_eq!(d.total_rounds, rounds);
    assert_eq!(d.fan_out, fan_out);
    assert_eq!(d.output, output);
}

#[test]
fn test_pairwise_roles_alternate() {
    let d = ProtocolKind::EcdsaTwoPartySign.descriptor();

    let p1: Vec<u32> = (1..=5).filter(|s| d.drives(Some(Role::P1), *s)).collect();
    let p2: Vec<u32> = (1..=5).filter(|s| d.drives(Some(Role::P2), *s)).collect();
    assert_eq!(p1, vec![1, 3, 5]);
    assert_eq!(p2, vec![2, 4]);

    assert_eq!(d.next_round(Some(Role::P2), 0), Some(2));
    assert_eq!(d.next_round(Some(Role::P1), 3), Some(5));
    assert_eq!(d.next_round(Some(Role::P1), 5), None);
    assert_eq!(d.last_round(Some(Role::P2)), Some(4));

    // Only P1's step 5 hands back final material.
    assert!(d.finalizes(Some(Role::P1), 5));
    assert!(!d.finalizes(Some(Role::P2), 4));
}

#[test]
fn test_broadcast_rounds_run_in_sequence() {
    let d = ProtocolKind::DistributedKeyGen.descriptor();

    assert_eq!(d.next_round(None, 0), Some(1));
    assert_eq!(d.next_round(None, 2), Some(3));
    assert_eq!(d.next_round(None, 3), None);
    assert!(!d.requires_inbound(1));
    assert!(d.requires_inbound(2));
    assert!(d.finalizes(None, 3));
    assert!(!d.finalizes(None, 2));
}

fn key() -> Zeroizing<Vec<u8>> {
    Zeroizing::new(b"{}".to_vec())
}

#[test_case(ProtocolParams::keygen(PartyId(1), 2, &parties(&[1, 2, 3]), Curve::Secp256k1) ; "keygen")]
#[test_case(ProtocolParams::refresh(PartyId(2), 2, &parties(&[3, 1, 2]), Curve::Ed25519, key()) ; "refresh with unsorted input")]
#[test_case(ProtocolParams::ed25519_sign(PartyId(3), 2, &parties(&[1, 3]), key(), b"msg".to_vec()) ; "ed25519 signer subset")]
#[test_case(ProtocolParams::ecdsa_sign(Role::P2, PartyId(2), PartyId(1), key(), b"msg".to_vec()) ; "ecdsa p2")]
fn test_valid_params_pass(params: ProtocolParams) {
    params.validate(100).unwrap();
}

#[test_case(ProtocolParams::keygen(PartyId(1), 0, &parties(&[1, 2, 3]), Curve::Secp256k1) ; "zero threshold")]
#[test_case(ProtocolParams::keygen(PartyId(1), 4, &parties(&[1, 2, 3]), Curve::Secp256k1) ; "threshold above party count")]
#[test_case(ProtocolParams::keygen(PartyId(1), 1, &parties(&[1]), Curve::Secp256k1) ; "single party")]
#[test_case(ProtocolParams::keygen(PartyId(4), 2, &parties(&[1, 2, 3]), Curve::Secp256k1) ; "party outside its set")]
#[test_case(ProtocolParams::keygen(PartyId(1), 2, &parties(&[1, 2, 2]), Curve::Secp256k1) ; "duplicate party")]
#[test_case(ProtocolParams::keygen(PartyId(1), 2, &parties(&[0, 1, 2]), Curve::Secp256k1) ; "zero party id")]
#[test_case(ProtocolParams::ed25519_sign(PartyId(1), 2, &parties(&[1, 2]), key(), Vec::new()) ; "empty message")]
#[test_case(ProtocolParams::ecdsa_sign(Role::P1, PartyId(1), PartyId(1), key(), b"m".to_vec()) ; "ecdsa without a distinct peer")]
fn test_invalid_params_are_rejected(params: ProtocolParams) {
    let err = params.validate(100).unwrap_err();
    assert!(matches!(err, RouterError::InvalidParam(_)), "got {err:?}");
}

#[test]
fn test_refresh_without_key_material_is_rejected() {
    let mut params = ProtocolParams::refresh(PartyId(1), 2, &parties(&[1, 2]), Curve::Secp256k1, key());
    params.prior_key_material = None;

    assert!(matches!(params.validate(100), Err(RouterError::InvalidParam(_))));
}

#[test]
fn test_party_limit_is_enforced() {
    let ids: Vec<u32> = (1..=5).collect();
    let params = ProtocolParams::keygen(PartyId(1), 3, &parties(&ids), Curve::Secp256k1);

    assert!(params.validate(5).is_ok());
    assert!(matches!(params.validate(4), Err(RouterError::InvalidParam(_))));
}

#[test]
fn test_role_only_allowed_for_two_party_signing() {
    let mut params = ProtocolParams::keygen(PartyId(1), 2, &parties(&[1, 2]), Curve::Secp256k1);
    params.role = Some(Role::P1);

    assert!(matches!(params.validate(100), Err(RouterError::InvalidParam(_))));
}

#[test]
fn test_wrong_curve_for_signing_is_rejected() {
    let mut params = ProtocolParams::ed25519_sign(PartyId(1), 2, &parties(&[1, 2]), key(), b"m".to_vec());
    params.curve = Curve::Secp256k1;

    assert!(matches!(params.validate(100), Err(RouterError::InvalidParam(_))));
}

#[test]
fn test_peer_is_the_other_party() {
    let params = ProtocolParams::ecdsa_sign(Role::P1, PartyId(7), PartyId(3), key(), b"m".to_vec());

    assert_eq!(params.party_set, parties(&[3, 7]));
    assert_eq!(params.peer(), Some(PartyId(3)));
    assert_eq!(params.peers().collect::<Vec<_>>(), vec![PartyId(3)]);
}

#[test_case(1, Ok(1))]
#[test_case(i32::MAX as u32, Ok(i32::MAX))]
#[test_case(i32::MAX as u32 + 1, Err(()) ; "one past c_int max")]
#[test_case(u32::MAX, Err(()) ; "would wrap to -1")]
fn test_party_ids_cross_the_ffi_unchanged(id: u32, expected: Result<i32, ()>) {
    let converted = ffi_party_id(PartyId(id));
    match expected {
        Ok(value) => assert_eq!(converted, Ok(value)),
        Err(()) => assert!(matches!(converted, Err(EngineError { code: EngineError::INVALID_PARAM, .. }))),
    }
}
