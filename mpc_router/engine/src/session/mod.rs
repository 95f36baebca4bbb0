//! One party's run of one protocol instance.

mod batch;

pub use batch::InboundBatch;

use std::sync::Arc;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::envelope;
use crate::error::RouterError;
use crate::protocol::{FanOut, ProtocolDescriptor, ProtocolParams, Role};
use crate::round_engine::{EngineHandle, RoundEngine};
use crate::types::{PartyId, SessionHandle, SessionState};

/// What a successful round hands back.
#[derive(Debug)]
pub enum RoundOutput {
    /// Outbound envelope (broadcast) or the single payload for the peer (pairwise).
    Envelope(Vec<u8>),
    /// Key-share or signature material from the terminal round.
    Final(Zeroizing<Vec<u8>>),
}

impl RoundOutput {
    pub fn is_final(&self) -> bool {
        matches!(self, RoundOutput::Final(_))
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            RoundOutput::Envelope(bytes) => bytes,
            RoundOutput::Final(bytes) => bytes,
        }
    }
}

/// Holds the engine handle exclusively and releases it exactly once, on
/// [`Session::destroy`] or on drop, whichever comes first.
pub struct Session {
    handle: SessionHandle,
    params: ProtocolParams,
    descriptor: ProtocolDescriptor,
    /// Last round completed; 0 before the first.
    round: u32,
    state: SessionState,
    engine: Arc<dyn RoundEngine>,
    engine_handle: Option<EngineHandle>,
}

impl Session {
    /// Validate `params` and acquire an engine handle.
    pub fn init(
        handle: SessionHandle,
        engine: Arc<dyn RoundEngine>,
        params: ProtocolParams,
        max_parties: usize,
    ) -> Result<Self, RouterError> {
        params.validate(max_parties)?;
        let engine_handle = engine.init(&params)?;

        debug!(
            %handle,
            party = %params.party_id,
            kind = %params.kind,
            %engine_handle,
            "session initialized"
        );

        Ok(Session {
            handle,
            descriptor: params.kind.descriptor(),
            params,
            round: 0,
            state: SessionState::Initialized,
            engine,
            engine_handle: Some(engine_handle),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn party_id(&self) -> PartyId {
        self.params.party_id
    }

    pub fn role(&self) -> Option<Role> {
        self.params.role
    }

    pub fn party_set(&self) -> &[PartyId] {
        &self.params.party_set
    }

    pub fn descriptor(&self) -> ProtocolDescriptor {
        self.descriptor
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The round the next `advance` must target, if any remain.
    pub fn expected_round(&self) -> Option<u32> {
        if self.state.is_terminal() {
            return None;
        }
        self.descriptor.next_round(self.params.role, self.round)
    }

    /// Run the next round with `batch`.
    ///
    /// Any failure other than calling into an already-terminal session moves
    /// the session to `Failed`; there is no retry.
    pub fn advance(&mut self, batch: &InboundBatch) -> Result<RoundOutput, RouterError> {
        if self.state.is_terminal() {
            return Err(RouterError::SessionTerminated { state: self.state });
        }

        let result = self.run_round(batch);
        if let Err(err) = &result {
            self.state = SessionState::Failed;
            warn!(
                handle = %self.handle,
                party = %self.params.party_id,
                round = batch.round(),
                error = %err,
                "session failed"
            );
        }
        result
    }

    fn run_round(&mut self, batch: &InboundBatch) -> Result<RoundOutput, RouterError> {
        let role = self.params.role;
        let expected = self
            .descriptor
            .next_round(role, self.round)
            .ok_or(RouterError::SessionTerminated { state: self.state })?;
        if batch.round() != expected {
            return Err(RouterError::RoundMismatch {
                expected,
                got: batch.round(),
            });
        }
        let engine_handle = self
            .engine_handle
            .ok_or(RouterError::SessionTerminated { state: SessionState::Destroyed })?;

        let inbound = match self.descriptor.fan_out {
            FanOut::Broadcast => self.broadcast_inbound(batch)?,
            FanOut::Pairwise => self.pairwise_inbound(batch)?,
        };

        self.state = SessionState::RoundInProgress;
        let output = if self.descriptor.finalizes(role, expected) {
            let material = self.engine.finalize(engine_handle, inbound.as_deref().unwrap_or_default())?;
            RoundOutput::Final(Zeroizing::new(material))
        } else {
            let out = self.engine.advance(engine_handle, expected, inbound.as_deref())?;
            if self.descriptor.fan_out == FanOut::Broadcast {
                self.check_outbound(&out)?;
            }
            RoundOutput::Envelope(out)
        };

        self.round = expected;
        self.state = if Some(expected) == self.descriptor.last_round(role) {
            SessionState::Completed
        } else {
            SessionState::AwaitingInbound
        };

        info!(
            handle = %self.handle,
            party = %self.params.party_id,
            round = expected,
            state = %self.state,
            "round advanced"
        );
        Ok(output)
    }

    /// Round 1 takes nothing; every later round needs exactly one payload
    /// from every other party in the active set.
    fn broadcast_inbound(&self, batch: &InboundBatch) -> Result<Option<Vec<u8>>, RouterError> {
        let round = batch.round();
        if !self.descriptor.requires_inbound(round) {
            if !batch.is_empty() {
                return Err(RouterError::InvalidParam(format!("round {round} takes no inbound batch")));
            }
            return Ok(None);
        }

        let me = self.params.party_id;
        if let Some(from) = self.params.peers().find(|p| batch.get(*p).is_none()) {
            return Err(RouterError::MissingMessage {
                from,
                to: me,
                round: round - 1,
            });
        }
        if let Some(stranger) = batch.senders().find(|s| *s == me || !self.party_set().contains(s)) {
            return Err(RouterError::InvalidParam(format!(
                "unexpected sender {stranger} in batch for party {me}"
            )));
        }
        Ok(Some(batch.to_bytes()))
    }

    /// Step 1 takes nothing; every later step takes the peer's last payload, verbatim.
    fn pairwise_inbound(&self, batch: &InboundBatch) -> Result<Option<Vec<u8>>, RouterError> {
        let step = batch.round();
        let peer = self
            .params
            .peer()
            .ok_or_else(|| RouterError::InvalidParam("pairwise session without a peer".into()))?;

        if !self.descriptor.requires_inbound(step) {
            if !batch.is_empty() {
                return Err(RouterError::InvalidParam(format!("step {step} takes no inbound payload")));
            }
            return Ok(None);
        }

        let payload = batch.get(peer).ok_or_else(|| {
            RouterError::InvalidParam(format!("step {step} has no preceding payload from party {peer}"))
        })?;
        if batch.len() != 1 {
            return Err(RouterError::InvalidParam(format!(
                "step {step} takes a single payload from party {peer}"
            )));
        }
        Ok(Some(payload.to_vec()))
    }

    /// An outbound envelope must parse and address only other members of the active set.
    fn check_outbound(&self, out: &[u8]) -> Result<(), RouterError> {
        let me = self.params.party_id;
        for to in envelope::recipients(out)? {
            if to == me {
                return Err(RouterError::EnvelopeParse {
                    offset: 0,
                    reason: format!("party {me} addressed an entry to itself"),
                });
            }
            if !self.party_set().contains(&to) {
                return Err(RouterError::EnvelopeParse {
                    offset: 0,
                    reason: format!("entry addressed to party {to} outside the active set"),
                });
            }
        }
        Ok(())
    }

    /// Release the engine handle and mark the session destroyed. Safe to repeat.
    pub fn destroy(&mut self) {
        if let Some(engine_handle) = self.engine_handle.take() {
            self.engine.destroy(engine_handle);
            debug!(handle = %self.handle, %engine_handle, "engine handle released");
        }
        self.state = SessionState::Destroyed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(engine_handle) = self.engine_handle.take() {
            self.engine.destroy(engine_handle);
        }
    }
}
