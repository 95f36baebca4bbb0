use std::collections::BTreeMap;

use crate::envelope;
use crate::error::RouterError;
use crate::types::PartyId;

/// Payloads addressed to one party for one round, keyed by sender.
///
/// Senders are kept in ascending order, so the aggregated bytes handed to
/// the engine are the same no matter which order payloads were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundBatch {
    round: u32,
    payloads: BTreeMap<PartyId, Vec<u8>>,
}

impl InboundBatch {
    /// An empty batch for `round`.
    pub fn new(round: u32) -> Self {
        InboundBatch {
            round,
            payloads: BTreeMap::new(),
        }
    }

    /// The empty batch that opens every protocol.
    pub fn first() -> Self {
        Self::new(1)
    }

    /// The single payload a pairwise step consumes.
    pub fn from_peer(round: u32, from: PartyId, payload: impl Into<Vec<u8>>) -> Self {
        let mut batch = Self::new(round);
        batch.payloads.insert(from, payload.into());
        batch
    }

    /// Add `from`'s payload. A second payload from the same sender is rejected.
    pub fn insert(&mut self, from: PartyId, payload: impl Into<Vec<u8>>) -> Result<(), RouterError> {
        if self.payloads.contains_key(&from) {
            return Err(RouterError::InvalidParam(format!(
                "duplicate payload from party {from} for round {}",
                self.round
            )));
        }
        self.payloads.insert(from, payload.into());
        Ok(())
    }

    /// Round this batch is meant to drive.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn senders(&self) -> impl Iterator<Item = PartyId> + '_ {
        self.payloads.keys().copied()
    }

    pub fn get(&self, from: PartyId) -> Option<&[u8]> {
        self.payloads.get(&from).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Array-shaped engine input, senders in ascending order.
    pub fn to_bytes(&self) -> Vec<u8> {
        envelope::aggregate(self.payloads.values())
    }
}
