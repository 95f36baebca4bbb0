use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread;

use crate::audit::AuditEventType;
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::protocol::{Curve, ProtocolKind, ProtocolParams};
use crate::registry::SessionRegistry;
use crate::router::orchestrator;
use crate::session::InboundBatch;
use crate::tests::{keygen, parties, registry_on, simulated};
use crate::types::{PartyId, SessionHandle, SessionState};

fn keygen_params(party: u32, ids: &[u32]) -> ProtocolParams {
    ProtocolParams::keygen(PartyId(party), 2, &parties(ids), Curve::Secp256k1)
}

#[test]
fn test_unknown_handle_is_invalid() {
    let registry = registry_on(&simulated());
    let handle = SessionHandle::generate();

    assert!(matches!(registry.state(handle), Err(RouterError::InvalidHandle(h)) if h == handle));
    assert!(matches!(
        registry.advance(handle, &InboundBatch::first()),
        Err(RouterError::InvalidHandle(_))
    ));
    assert!(matches!(registry.destroy(handle), Err(RouterError::InvalidHandle(_))));
}

#[test]
fn test_destroy_twice_is_a_no_op() {
    let engine = simulated();
    let registry = registry_on(&engine);
    let handle = registry.init(keygen_params(1, &[1, 2])).unwrap();

    registry.destroy(handle).unwrap();
    registry.destroy(handle).unwrap();

    assert_eq!(engine.released_handles(), 1);
    assert_eq!(registry.live_sessions(), 0);
    assert!(matches!(
        registry.advance(handle, &InboundBatch::first()),
        Err(RouterError::InvalidHandle(_))
    ));
    assert!(matches!(registry.round(handle), Err(RouterError::InvalidHandle(_))));
}

#[test]
fn test_destroyed_handles_stay_recognized_without_bookkeeping() {
    let engine = simulated();
    let registry = registry_on(&engine);
    let first = registry.init(keygen_params(1, &[1, 2])).unwrap();
    registry.destroy(first).unwrap();

    let mut seen = HashSet::from([first]);
    for _ in 0..500 {
        let handle = registry.init(keygen_params(2, &[1, 2])).unwrap();
        assert!(seen.insert(handle), "handle {handle} was issued twice");
        registry.destroy(handle).unwrap();
    }

    registry.destroy(first).unwrap();
    assert_eq!(engine.released_handles(), 501);
    assert_eq!(registry.live_sessions(), 0);
}

#[test]
fn test_handle_from_another_registry_is_invalid() {
    let engine = simulated();
    let ours = registry_on(&engine);
    let theirs = registry_on(&engine);
    let handle = theirs.init(keygen_params(1, &[1, 2])).unwrap();

    assert!(matches!(ours.destroy(handle), Err(RouterError::InvalidHandle(_))));
    assert!(matches!(ours.state(handle), Err(RouterError::InvalidHandle(_))));

    theirs.destroy(handle).unwrap();
    assert!(matches!(ours.destroy(handle), Err(RouterError::InvalidHandle(_))));
}

#[test]
fn test_introspection_tracks_progress() {
    let registry = registry_on(&simulated());
    let handle = registry.init(keygen_params(1, &[1, 2, 3])).unwrap();

    assert_eq!(registry.descriptor(handle).unwrap().kind, ProtocolKind::DistributedKeyGen);
    assert_eq!(registry.state(handle).unwrap(), SessionState::Initialized);

    registry.advance(handle, &InboundBatch::first()).unwrap();
    assert_eq!(registry.state(handle).unwrap(), SessionState::AwaitingInbound);
    assert_eq!(registry.round(handle).unwrap(), 1);
    assert_eq!(registry.live_sessions(), 1);
}

#[test]
fn test_invalid_params_never_reach_the_engine() {
    let engine = simulated();
    let registry = registry_on(&engine);

    let err = registry.init(keygen_params(5, &[1, 2, 3])).unwrap_err();
    assert!(matches!(err, RouterError::InvalidParam(_)));
    assert_eq!(engine.live_handles(), 0);
    assert_eq!(registry.live_sessions(), 0);
}

#[test]
fn test_configured_party_limit_applies_at_init() {
    let config = RouterConfig {
        max_parties: 3,
        ..RouterConfig::default()
    };
    let registry = SessionRegistry::with_config(simulated(), &config);

    assert!(registry.init(keygen_params(1, &[1, 2, 3])).is_ok());
    assert!(matches!(
        registry.init(keygen_params(1, &[1, 2, 3, 4])),
        Err(RouterError::InvalidParam(_))
    ));
}

#[test]
fn test_lifecycle_is_audited() {
    let registry = registry_on(&simulated());
    let handle = registry.init(keygen_params(1, &[1, 2])).unwrap();
    registry.advance(handle, &InboundBatch::first()).unwrap();
    registry.advance(handle, &InboundBatch::first()).unwrap_err();
    registry.destroy(handle).unwrap();

    let events: Vec<AuditEventType> = registry
        .audit()
        .for_session(handle)
        .into_iter()
        .map(|r| r.event_type)
        .collect();
    assert_eq!(
        events,
        vec![
            AuditEventType::SessionInit,
            AuditEventType::RoundAdvanced,
            AuditEventType::Failed,
            AuditEventType::Destroyed,
        ]
    );
}

#[test]
fn test_completed_run_is_audited_per_party() {
    let registry = registry_on(&simulated());
    keygen(&registry, &[1, 2, 3], 2, Curve::Secp256k1);

    let completed = registry
        .audit()
        .recent(100)
        .into_iter()
        .filter(|r| r.event_type == AuditEventType::Completed)
        .count();
    assert_eq!(completed, 3);
}

#[test]
fn test_independent_instances_run_in_parallel() {
    let engine = simulated();
    let registry = Arc::new(registry_on(&engine));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let ids = [1, 2, 3];
                let params = ids.iter().map(|p| keygen_params(*p, &ids)).collect();
                orchestrator::run(&registry, params).unwrap()
            })
        })
        .collect();

    let mut public_keys = Vec::new();
    for worker in workers {
        let outputs = worker.join().unwrap();
        assert_eq!(outputs.len(), 3);
        public_keys.push(crate::tests::key_share(&outputs[&PartyId(1)]).public_key);
    }

    // Each instance derived its own key.
    public_keys.sort();
    public_keys.dedup();
    assert_eq!(public_keys.len(), 4);
    assert_eq!(registry.live_sessions(), 0);
    assert_eq!(engine.live_handles(), 0);
    assert_eq!(engine.released_handles(), 12);
}

#[test]
fn test_sessions_of_one_instance_on_many_threads() {
    let engine = simulated();
    let registry = Arc::new(registry_on(&engine));
    let ids = [1, 2, 3];
    let handles: BTreeMap<PartyId, SessionHandle> = ids
        .iter()
        .map(|p| (PartyId(*p), registry.init(keygen_params(*p, &ids)).unwrap()))
        .collect();

    let round_one: Vec<_> = handles
        .iter()
        .map(|(party, handle)| {
            let (registry, party, handle) = (Arc::clone(&registry), *party, *handle);
            thread::spawn(move || (party, registry.advance(handle, &InboundBatch::first()).unwrap()))
        })
        .collect();

    for worker in round_one {
        let (_, output) = worker.join().unwrap();
        assert!(!output.is_final());
    }
    for handle in handles.values() {
        assert_eq!(registry.state(*handle).unwrap(), SessionState::AwaitingInbound);
        registry.destroy(*handle).unwrap();
    }
    assert_eq!(engine.live_handles(), 0);
}
