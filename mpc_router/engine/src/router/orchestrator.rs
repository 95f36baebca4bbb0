//! Drives a whole protocol instance across sessions held by one registry.
//!
//! Every party runs in-process here; a deployment would move the envelopes
//! over a transport instead, but the routing is the same.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::RouterError;
use crate::protocol::{FanOut, ProtocolParams, Role};
use crate::registry::SessionRegistry;
use crate::router::Router;
use crate::session::{InboundBatch, RoundOutput};
use crate::types::{PartyId, SessionHandle};

/// Final material per party.
pub type Outputs = BTreeMap<PartyId, Zeroizing<Vec<u8>>>;

/// Init one session per entry of `params`, run the protocol to the end, and
/// destroy every session that was created, whether the run succeeded or not.
pub fn run(registry: &SessionRegistry, params: Vec<ProtocolParams>) -> Result<Outputs, RouterError> {
    let kind = params
        .first()
        .map(|p| p.kind)
        .ok_or_else(|| RouterError::InvalidParam("no parties to run".into()))?;
    if params.iter().any(|p| p.kind != kind) {
        return Err(RouterError::InvalidParam("all parties must run the same protocol".into()));
    }

    let mut handles = BTreeMap::new();
    let mut roles = BTreeMap::new();
    let result = (|| -> Result<Outputs, RouterError> {
        for p in params {
            let party = p.party_id;
            if handles.contains_key(&party) {
                return Err(RouterError::InvalidParam(format!("party {party} appears twice")));
            }
            roles.insert(party, p.role);
            handles.insert(party, registry.init(p)?);
        }

        match kind.descriptor().fan_out {
            FanOut::Broadcast => run_broadcast(registry, &handles),
            FanOut::Pairwise => {
                let by_role = |role: Role| {
                    roles
                        .iter()
                        .find(|(_, r)| **r == Some(role))
                        .map(|(p, _)| (*p, handles[p]))
                        .ok_or_else(|| RouterError::InvalidParam(format!("no party plays {role:?}")))
                };
                let p1 = by_role(Role::P1)?;
                let p2 = by_role(Role::P2)?;
                let signature = run_two_party(registry, p1, p2)?;
                Ok(BTreeMap::from([(p1.0, signature)]))
            }
        }
    })();

    for handle in handles.values() {
        if let Err(err) = registry.destroy(*handle) {
            warn!(%handle, error = %err, "failed to destroy session after run");
        }
    }
    result
}

/// Run every round of a broadcast protocol over already-initialized sessions.
pub fn run_broadcast(
    registry: &SessionRegistry,
    handles: &BTreeMap<PartyId, SessionHandle>,
) -> Result<Outputs, RouterError> {
    let router = Router::new(registry.format());
    let active: Vec<PartyId> = handles.keys().copied().collect();
    let first = handles
        .values()
        .next()
        .ok_or_else(|| RouterError::InvalidParam("no sessions to run".into()))?;
    let total = registry.descriptor(*first)?.total_rounds;

    let mut batches: BTreeMap<PartyId, InboundBatch> =
        active.iter().map(|p| (*p, InboundBatch::first())).collect();
    let mut finals = Outputs::new();

    for round in 1..=total {
        let mut envelopes = BTreeMap::new();
        for (party, handle) in handles {
            let batch = batches
                .get(party)
                .ok_or_else(|| RouterError::InvalidParam(format!("no batch for party {party}")))?;
            match registry.advance(*handle, batch)? {
                RoundOutput::Envelope(envelope) => {
                    envelopes.insert(*party, envelope);
                }
                RoundOutput::Final(material) => {
                    finals.insert(*party, material);
                }
            }
        }
        debug!(round, envelopes = envelopes.len(), "broadcast round done");

        if round < total {
            batches = router.route_broadcast(round, &active, &envelopes)?;
        }
    }

    info!(parties = active.len(), rounds = total, "broadcast protocol completed");
    Ok(finals)
}

/// Prepare both parties' keygen shares for two-party ECDSA signing.
///
/// P2 publishes its parameters, P1 prepares and messages P2, then P2
/// prepares. Returns the (P1, P2) material `ProtocolParams::ecdsa_sign` takes.
pub fn prepare_ecdsa(
    registry: &SessionRegistry,
    p1: (PartyId, &[u8]),
    p2: (PartyId, &[u8]),
) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>), RouterError> {
    if p1.0 == p2.0 {
        return Err(RouterError::InvalidParam(format!("party {} cannot sign with itself", p1.0)));
    }
    let engine = registry.engine();
    let p2_params = engine.ecdsa_p2_params()?;
    let prepared = engine.ecdsa_prepare_p1(p1.1, p2.0, &p2_params)?;
    let p2_material = engine.ecdsa_prepare_p2(p2.1, p1.0, &prepared.message, &p2_params)?;

    info!(p1 = %p1.0, p2 = %p2.0, "two-party ecdsa keys prepared");
    Ok((prepared.material, p2_material))
}

/// Alternate the two roles through every step; P1's last step yields the signature.
pub fn run_two_party(
    registry: &SessionRegistry,
    p1: (PartyId, SessionHandle),
    p2: (PartyId, SessionHandle),
) -> Result<Zeroizing<Vec<u8>>, RouterError> {
    let descriptor = registry.descriptor(p1.1)?;
    let mut batch = InboundBatch::first();

    for step in 1..=descriptor.total_rounds {
        let (party, handle) = if descriptor.drives(Some(Role::P1), step) { p1 } else { p2 };
        match registry.advance(handle, &batch)? {
            RoundOutput::Envelope(payload) => {
                debug!(step, from = %party, bytes = payload.len(), "pairwise step done");
                batch = Router::route_pairwise(step, party, &payload);
            }
            RoundOutput::Final(signature) => {
                info!(steps = step, "two-party protocol completed");
                return Ok(signature);
            }
        }
    }
    Err(RouterError::InvalidParam("two-party run ended without final material".into()))
}
