//! Session and routing core for multi-party threshold protocols.
//!
//! Each party drives its own [`session::Session`] through a fixed number of
//! rounds. Every round produces an envelope of messages addressed to the
//! other parties; the [`router::Router`] picks those envelopes apart and
//! assembles the exact inbound batch each party needs for the next round.
//! The cryptography itself lives behind [`round_engine::RoundEngine`].

pub mod audit;
pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod round_engine;
pub mod router;
pub mod session;
pub mod types;

pub use config::RouterConfig;
pub use envelope::{Envelope, EnvelopeError, EnvelopeFormat};
pub use error::{ConfigError, EngineError, RouterError};
pub use protocol::{Curve, ProtocolDescriptor, ProtocolKind, ProtocolParams, Role};
pub use registry::SessionRegistry;
pub use round_engine::{EcdsaP1Prepared, EngineHandle, RoundEngine};
pub use router::Router;
pub use session::{InboundBatch, RoundOutput, Session};
pub use types::{PartyId, SessionHandle, SessionState};

#[cfg(test)]
mod tests;
