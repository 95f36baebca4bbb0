//! Parameters handed to the round engine when a session starts.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::RouterError;
use crate::protocol::{FanOut, ProtocolKind};
use crate::types::PartyId;

/// Curve the key material lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    #[default]
    Secp256k1,
    Ed25519,
}

impl Curve {
    /// Numeric curve selector understood by the native engine.
    pub fn code(self) -> i32 {
        match self {
            Curve::Secp256k1 => 0,
            Curve::Ed25519 => 1,
        }
    }
}

/// The two fixed roles of the two-party ECDSA protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Opens the exchange and produces the signature.
    P1,
    P2,
}

/// Everything the engine needs to start one party's run of a protocol.
#[derive(Debug, Clone)]
pub struct ProtocolParams {
    pub kind: ProtocolKind,
    pub party_id: PartyId,
    pub threshold: u16,
    /// Active set: all parties for keygen/refresh, the signer subset for
    /// Ed25519, `[self, peer]` for two-party ECDSA. Kept sorted.
    pub party_set: Vec<PartyId>,
    pub curve: Curve,
    /// Key-share material from an earlier keygen or refresh.
    pub prior_key_material: Option<Zeroizing<Vec<u8>>>,
    /// Message to sign.
    pub message: Option<Vec<u8>>,
    /// Set only for two-party ECDSA.
    pub role: Option<Role>,
}

impl ProtocolParams {
    pub fn keygen(party_id: PartyId, threshold: u16, parties: &[PartyId], curve: Curve) -> Self {
        ProtocolParams {
            kind: ProtocolKind::DistributedKeyGen,
            party_id,
            threshold,
            party_set: sorted(parties),
            curve,
            prior_key_material: None,
            message: None,
            role: None,
        }
    }

    pub fn refresh(
        party_id: PartyId,
        threshold: u16,
        parties: &[PartyId],
        curve: Curve,
        key_material: Zeroizing<Vec<u8>>,
    ) -> Self {
        ProtocolParams {
            kind: ProtocolKind::KeyRefresh,
            party_id,
            threshold,
            party_set: sorted(parties),
            curve,
            prior_key_material: Some(key_material),
            message: None,
            role: None,
        }
    }

    pub fn ed25519_sign(
        party_id: PartyId,
        threshold: u16,
        signers: &[PartyId],
        key_material: Zeroizing<Vec<u8>>,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        ProtocolParams {
            kind: ProtocolKind::Ed25519ThresholdSign,
            party_id,
            threshold,
            party_set: sorted(signers),
            curve: Curve::Ed25519,
            prior_key_material: Some(key_material),
            message: Some(message.into()),
            role: None,
        }
    }

    pub fn ecdsa_sign(
        role: Role,
        party_id: PartyId,
        peer: PartyId,
        key_material: Zeroizing<Vec<u8>>,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        ProtocolParams {
            kind: ProtocolKind::EcdsaTwoPartySign,
            party_id,
            threshold: 2,
            party_set: sorted(&[party_id, peer]),
            curve: Curve::Secp256k1,
            prior_key_material: Some(key_material),
            message: Some(message.into()),
            role: Some(role),
        }
    }

    /// Parties other than this one, ascending.
    pub fn peers(&self) -> impl Iterator<Item = PartyId> + '_ {
        self.party_set.iter().copied().filter(move |p| *p != self.party_id)
    }

    /// The single counterpart of a pairwise protocol.
    pub fn peer(&self) -> Option<PartyId> {
        match self.kind.descriptor().fan_out {
            FanOut::Pairwise => self.peers().next(),
            FanOut::Broadcast => None,
        }
    }

    /// Reject parameter sets no engine could run. Checked before the engine is touched.
    pub fn validate(&self, max_parties: usize) -> Result<(), RouterError> {
        let invalid = |msg: String| Err(RouterError::InvalidParam(msg));
        let n = self.party_set.len();

        if self.party_set.iter().any(|p| p.0 == 0) {
            return invalid("party ids must be positive".into());
        }
        if self.party_set.windows(2).any(|w| w[0] >= w[1]) {
            return invalid("party set must be sorted and free of duplicates".into());
        }
        if !self.party_set.contains(&self.party_id) {
            return invalid(format!("party {} is not in its own party set", self.party_id));
        }
        if n > max_parties {
            return invalid(format!("party set of {n} exceeds the limit of {max_parties}"));
        }
        if n < 2 {
            return invalid(format!("party count cannot be < 2, found: {n}"));
        }
        if self.threshold == 0 || usize::from(self.threshold) > n {
            return invalid(format!(
                "threshold {} cannot be met by {n} parties",
                self.threshold
            ));
        }

        match self.kind {
            ProtocolKind::DistributedKeyGen => {}
            ProtocolKind::KeyRefresh => {
                if self.prior_key_material.is_none() {
                    return invalid("refresh requires prior key material".into());
                }
            }
            ProtocolKind::Ed25519ThresholdSign => {
                if self.curve != Curve::Ed25519 {
                    return invalid("ed25519 signing requires the ed25519 curve".into());
                }
                self.require_signing_inputs()?;
            }
            ProtocolKind::EcdsaTwoPartySign => {
                if n != 2 {
                    return invalid(format!("two-party signing needs exactly 2 parties, found: {n}"));
                }
                if self.role.is_none() {
                    return invalid("two-party signing requires a role".into());
                }
                if self.curve != Curve::Secp256k1 {
                    return invalid("ecdsa signing requires the secp256k1 curve".into());
                }
                self.require_signing_inputs()?;
            }
        }

        if self.role.is_some() && self.kind != ProtocolKind::EcdsaTwoPartySign {
            return invalid(format!("{} does not take a role", self.kind));
        }
        Ok(())
    }

    fn require_signing_inputs(&self) -> Result<(), RouterError> {
        if self.prior_key_material.is_none() {
            return Err(RouterError::InvalidParam("signing requires key material".into()));
        }
        if self.message.as_ref().is_none_or(|m| m.is_empty()) {
            return Err(RouterError::InvalidParam("signing requires a message".into()));
        }
        Ok(())
    }
}

fn sorted(parties: &[PartyId]) -> Vec<PartyId> {
    let mut out = parties.to_vec();
    out.sort();
    out
}
