mod audit_tests;
mod config_tests;
mod protocol_tests;
mod registry_tests;
mod router_tests;

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::protocol::{Curve, ProtocolParams};
use crate::registry::SessionRegistry;
use crate::round_engine::simulated::{SimKeyShare, SimSignature, SimulatedEngine};
use crate::router::orchestrator::{self, Outputs};
use crate::types::PartyId;

pub(crate) fn parties(ids: &[u32]) -> Vec<PartyId> {
    ids.iter().copied().map(PartyId).collect()
}

pub(crate) fn simulated() -> Arc<SimulatedEngine> {
    crate::logging::init_console_logging();
    Arc::new(SimulatedEngine::new())
}

pub(crate) fn registry_on(engine: &Arc<SimulatedEngine>) -> SessionRegistry {
    SessionRegistry::new(engine.clone())
}

/// Run a full keygen for `ids` and return every party's key material.
pub(crate) fn keygen(registry: &SessionRegistry, ids: &[u32], threshold: u16, curve: Curve) -> Outputs {
    let set = parties(ids);
    let params = set
        .iter()
        .map(|p| ProtocolParams::keygen(*p, threshold, &set, curve))
        .collect();
    orchestrator::run(registry, params).expect("keygen should complete")
}

pub(crate) fn key_share(material: &[u8]) -> SimKeyShare {
    serde_json::from_slice(material).expect("key material should be a key share")
}

pub(crate) fn signature(material: &[u8]) -> SimSignature {
    serde_json::from_slice(material).expect("final material should be a signature")
}

pub(crate) fn material_of(outputs: &Outputs, party: u32) -> Zeroizing<Vec<u8>> {
    outputs[&PartyId(party)].clone()
}

/// Prepare `p1` and `p2`'s keygen shares for two-party signing.
pub(crate) fn prepared(registry: &SessionRegistry, keys: &Outputs, p1: u32, p2: u32) -> (Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>) {
    orchestrator::prepare_ecdsa(
        registry,
        (PartyId(p1), &material_of(keys, p1)),
        (PartyId(p2), &material_of(keys, p2)),
    )
    .expect("key preparation should complete")
}
