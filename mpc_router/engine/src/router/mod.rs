//! Turns every party's round-`r` output into each party's round-`r + 1` input.
//!
//! The router holds no state beyond the envelope convention it reads, so it
//! can be shared across threads freely.

pub mod orchestrator;

use std::collections::BTreeMap;

use crate::envelope::{EnvelopeError, EnvelopeFormat};
use crate::error::RouterError;
use crate::session::InboundBatch;
use crate::types::PartyId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Router {
    format: EnvelopeFormat,
}

impl Router {
    pub fn new(format: EnvelopeFormat) -> Self {
        Router { format }
    }

    pub fn format(&self) -> EnvelopeFormat {
        self.format
    }

    /// Build `recipient`'s batch for round `round + 1` out of the round-`round`
    /// envelopes of the active set.
    ///
    /// Every other member of `active` must have produced an envelope with an
    /// entry for `recipient`; the first one that did not is reported as
    /// `MissingMessage` and no batch is returned.
    pub fn inbound_for(
        &self,
        recipient: PartyId,
        round: u32,
        active: &[PartyId],
        envelopes: &BTreeMap<PartyId, Vec<u8>>,
    ) -> Result<InboundBatch, RouterError> {
        let missing = |from| RouterError::MissingMessage {
            from,
            to: recipient,
            round,
        };

        let mut batch = InboundBatch::new(round + 1);
        for &from in active.iter().filter(|p| **p != recipient) {
            let envelope = envelopes.get(&from).ok_or_else(|| missing(from))?;
            let payload = match self.format.extract(envelope, recipient) {
                Ok(payload) => payload,
                Err(EnvelopeError::NotFound { .. }) => return Err(missing(from)),
                Err(err) => return Err(err.into()),
            };
            batch.insert(from, payload)?;
        }
        Ok(batch)
    }

    /// Batches for every member of `active`.
    pub fn route_broadcast(
        &self,
        round: u32,
        active: &[PartyId],
        envelopes: &BTreeMap<PartyId, Vec<u8>>,
    ) -> Result<BTreeMap<PartyId, InboundBatch>, RouterError> {
        active
            .iter()
            .map(|&p| Ok((p, self.inbound_for(p, round, active, envelopes)?)))
            .collect()
    }

    /// One side's step output becomes the other side's next step input, unchanged.
    pub fn route_pairwise(step: u32, from: PartyId, payload: &[u8]) -> InboundBatch {
        InboundBatch::from_peer(step + 1, from, payload)
    }
}
