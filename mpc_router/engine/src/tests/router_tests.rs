use std::collections::BTreeMap;

use test_case::test_case;

use crate::envelope::{Envelope, EnvelopeFormat};
use crate::error::RouterError;
use crate::router::Router;
use crate::tests::parties;
use crate::types::PartyId;

/// Round-`round` envelopes where party `from` sends `"<from>-><to>"` to every other party.
fn full_round(ids: &[u32], round: u32) -> BTreeMap<PartyId, Vec<u8>> {
    ids.iter()
        .map(|&from| {
            let env: Envelope = ids
                .iter()
                .filter(|&&to| to != from)
                .map(|&to| {
                    let payload = format!(r#"{{"From":{from},"To":{to},"Round":{round},"Data":"}}{{\"{to}\":"}}"#);
                    (PartyId(to), payload.into_bytes())
                })
                .collect();
            (PartyId(from), env.encode())
        })
        .collect()
}

#[test_case(2)]
#[test_case(3)]
#[test_case(5)]
fn test_every_party_gets_one_payload_per_peer(n: u32) {
    let ids: Vec<u32> = (1..=n).collect();
    let active = parties(&ids);
    let envelopes = full_round(&ids, 1);

    let batches = Router::default().route_broadcast(1, &active, &envelopes).unwrap();

    assert_eq!(batches.len(), n as usize);
    for (party, batch) in &batches {
        assert_eq!(batch.round(), 2);
        assert_eq!(batch.len(), n as usize - 1);
        assert!(batch.get(*party).is_none());
        for sender in batch.senders() {
            let expected = format!(r#"{{"From":{sender},"To":{party},"Round":1,"Data":"}}{{\"{party}\":"}}"#);
            assert_eq!(batch.get(sender).unwrap(), expected.as_bytes());
        }
    }
}

#[test]
fn test_withheld_envelope_is_missing_message() {
    let ids = [1, 2, 3];
    let mut envelopes = full_round(&ids, 1);
    envelopes.remove(&PartyId(3));

    let err = Router::default()
        .inbound_for(PartyId(1), 1, &parties(&ids), &envelopes)
        .unwrap_err();
    match err {
        RouterError::MissingMessage { from, to, round } => {
            assert_eq!((from, to, round), (PartyId(3), PartyId(1), 1));
        }
        other => panic!("expected MissingMessage, got {other:?}"),
    }
}

#[test]
fn test_entry_missing_from_envelope_is_missing_message() {
    let ids = [1, 2, 3];
    let mut envelopes = full_round(&ids, 1);
    // Party 2 forgot to address party 1.
    let env: Envelope = [(PartyId(3), b"{}".to_vec())].into_iter().collect();
    envelopes.insert(PartyId(2), env.encode());

    let err = Router::default()
        .route_broadcast(1, &parties(&ids), &envelopes)
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::MissingMessage { from, to, round: 1 } if from == PartyId(2) && to == PartyId(1)
    ));
}

#[test]
fn test_malformed_envelope_is_parse_error() {
    let ids = [1, 2];
    let mut envelopes = full_round(&ids, 1);
    envelopes.insert(PartyId(2), br#"{"1":{"From":2"#.to_vec());

    let err = Router::default()
        .inbound_for(PartyId(1), 1, &parties(&ids), &envelopes)
        .unwrap_err();
    assert!(matches!(err, RouterError::EnvelopeParse { .. }));
}

#[test]
fn test_envelopes_outside_active_set_are_ignored() {
    // Party 3 is not signing this time; its envelope must not leak in.
    let mut envelopes = full_round(&[1, 2, 3], 2);
    let active = parties(&[1, 2]);
    envelopes.retain(|p, _| *p != PartyId(1));
    envelopes.extend(full_round(&[1, 2], 2).into_iter().filter(|(p, _)| *p == PartyId(1)));

    let batch = Router::default().inbound_for(PartyId(2), 2, &active, &envelopes).unwrap();
    assert_eq!(batch.senders().collect::<Vec<_>>(), vec![PartyId(1)]);
    assert_eq!(batch.round(), 3);
}

#[test]
fn test_batch_bytes_do_not_depend_on_envelope_order() {
    let ids = [1, 2, 3, 4];
    let envelopes = full_round(&ids, 1);
    let reversed: BTreeMap<PartyId, Vec<u8>> = envelopes.clone().into_iter().rev().collect();
    let active = parties(&ids);
    let mut shuffled_active = active.clone();
    shuffled_active.reverse();

    let router = Router::default();
    let a = router.inbound_for(PartyId(2), 1, &active, &envelopes).unwrap();
    let b = router.inbound_for(PartyId(2), 1, &shuffled_active, &reversed).unwrap();

    assert_eq!(a, b);
    assert_eq!(a.to_bytes(), b.to_bytes());
    let text = String::from_utf8(a.to_bytes()).unwrap();
    assert!(text.starts_with(r#"[{"From":1,"#));
    assert!(text.contains(r#"},{"From":3,"#));
}

#[test]
fn test_data_field_router_unwraps_payloads() {
    let envelopes = BTreeMap::from([
        (PartyId(1), br#"{"2":{"from":1,"data":"one-to-two"}}"#.to_vec()),
        (PartyId(2), br#"{"1":{"from":2,"data":"two-to-one"}}"#.to_vec()),
    ]);
    let router = Router::new(EnvelopeFormat::DataField);

    let batches = router.route_broadcast(1, &parties(&[1, 2]), &envelopes).unwrap();
    assert_eq!(batches[&PartyId(1)].get(PartyId(2)).unwrap(), b"two-to-one");
    assert_eq!(batches[&PartyId(2)].get(PartyId(1)).unwrap(), b"one-to-two");
}

#[test]
fn test_pairwise_routing_hands_payload_over_unchanged() {
    let batch = Router::route_pairwise(3, PartyId(1), br#"{"Step":3}"#);

    assert_eq!(batch.round(), 4);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.get(PartyId(1)).unwrap(), br#"{"Step":3}"#);
}
