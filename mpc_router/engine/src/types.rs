//! Shared data types for the routing core: party ids, session handles, and session states.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a party inside one protocol instance.
///
/// Always positive. Envelope keys are the decimal rendering of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub u32);

impl PartyId {
    pub fn new(id: u32) -> Option<Self> {
        (id > 0).then_some(PartyId(id))
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartyId {
    fn from(id: u32) -> Self {
        PartyId(id)
    }
}

/// Opaque key into the session registry.
///
/// A registry issues handles as (registry origin, sequence number). The
/// sequence never repeats, so a handle that was destroyed can never alias a
/// session created later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(pub Uuid);

impl SessionHandle {
    /// A random handle outside any registry's sequence.
    pub fn generate() -> Self {
        SessionHandle(Uuid::new_v4())
    }

    pub(crate) fn sequenced(origin: u64, seq: u64) -> Self {
        SessionHandle(Uuid::from_u64_pair(origin, seq))
    }

    /// Sequence number, if the handle was issued under `origin`.
    pub(crate) fn sequence_under(&self, origin: u64) -> Option<u64> {
        let (high, low) = self.0.as_u64_pair();
        (high == origin).then_some(low)
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Engine handle acquired, nothing sent yet.
    Initialized,
    /// An engine call is running for this session.
    RoundInProgress,
    /// Last round succeeded, waiting for the next inbound batch.
    AwaitingInbound,
    Completed,
    Failed,
    Destroyed,
}

impl SessionState {
    /// Completed, Failed and Destroyed never transition again (except to Destroyed).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Destroyed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Initialized => "initialized",
            SessionState::RoundInProgress => "round-in-progress",
            SessionState::AwaitingInbound => "awaiting-inbound",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(label)
    }
}
