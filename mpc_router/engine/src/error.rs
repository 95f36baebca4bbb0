//! Centralized error types for the session and routing core.

use thiserror::Error;

use crate::types::{PartyId, SessionHandle, SessionState};

/// Opaque failure reported by the round engine.
///
/// `code` keeps the engine's numeric status so callers can log it, but
/// nothing in this crate branches on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub const INVALID_PARAM: i32 = -1;
    pub const MEMORY: i32 = -2;
    pub const CRYPTO: i32 = -3;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        EngineError {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAM, message)
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(Self::CRYPTO, message)
    }
}

/// Errors surfaced by every public operation of the routing core.
///
/// All of them are terminal for the session they concern: nothing in this
/// crate retries a round.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Bad threshold, party set, or missing protocol input.
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
    /// Failure reported by the round engine, passed through untouched.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Envelope bytes are not a well-formed nested structure.
    #[error("Envelope parse error at byte {offset}: {reason}")]
    EnvelopeParse { offset: usize, reason: String },
    /// An expected sender's entry is absent for a recipient.
    #[error("Missing message from party {from} to party {to} in round {round}")]
    MissingMessage {
        from: PartyId,
        to: PartyId,
        round: u32,
    },
    /// Inbound batch targets a round other than the session's next round.
    #[error("Round mismatch: expected round {expected}, got {got}")]
    RoundMismatch { expected: u32, got: u32 },
    /// The session already reached a terminal state.
    #[error("Session terminated ({state})")]
    SessionTerminated { state: SessionState },
    /// Unknown or destroyed session handle.
    #[error("Invalid session handle: {0}")]
    InvalidHandle(SessionHandle),
}

/// Errors raised while loading a [`crate::config::RouterConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
