//! The narrow seam to the cryptographic round engine.
//!
//! The engine does the math; this crate only decides when each call is made
//! and with which bytes. Implementations must be safe to share across
//! threads. Callers never issue two calls on the same handle concurrently.

pub mod simulated;

#[cfg(feature = "native-engine")]
pub mod native;

use std::ffi::c_int;
use std::fmt;

use zeroize::Zeroizing;

use crate::error::EngineError;
use crate::protocol::ProtocolParams;
use crate::types::PartyId;

/// Engine-side identifier of one party's protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// P1's half of two-party ECDSA key preparation.
pub struct EcdsaP1Prepared {
    /// P1's signing material for `ecdsa_sign`.
    pub material: Zeroizing<Vec<u8>>,
    /// Handed to P2 so it can finish its half.
    pub message: Vec<u8>,
}

pub trait RoundEngine: Send + Sync {
    /// Allocate engine state for one party's run of a protocol.
    fn init(&self, params: &ProtocolParams) -> Result<EngineHandle, EngineError>;

    /// Run a non-terminal round. `inbound` is `None` only for the opening move.
    fn advance(
        &self,
        handle: EngineHandle,
        round: u32,
        inbound: Option<&[u8]>,
    ) -> Result<Vec<u8>, EngineError>;

    /// Run the terminal round and hand back key-share or signature material.
    fn finalize(&self, handle: EngineHandle, inbound: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Release engine state. Unknown or already released handles are ignored.
    fn destroy(&self, handle: EngineHandle);

    /// P2's pre-parameters, the first input of two-party ECDSA key preparation.
    fn ecdsa_p2_params(&self) -> Result<Vec<u8>, EngineError>;

    /// Turn P1's keygen share into two-party signing material.
    fn ecdsa_prepare_p1(&self, key: &[u8], peer: PartyId, p2_params: &[u8]) -> Result<EcdsaP1Prepared, EngineError>;

    /// Turn P2's keygen share into two-party signing material, using the
    /// message P1's preparation produced.
    fn ecdsa_prepare_p2(
        &self,
        key: &[u8],
        p1: PartyId,
        p1_message: &[u8],
        p2_params: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EngineError>;
}

/// Party id as the native ABI takes it. Ids past `c_int::MAX` are rejected
/// instead of wrapping into another party's id.
pub fn ffi_party_id(id: PartyId) -> Result<c_int, EngineError> {
    c_int::try_from(id.0).map_err(|_| EngineError::invalid_param(format!("party id {id} out of range for the engine")))
}
