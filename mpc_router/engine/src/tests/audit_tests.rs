use std::thread;

use crate::audit::{AuditEventType, AuditRecord, AuditTracker};
use crate::types::{PartyId, SessionHandle};

#[test]
fn test_audit_log_adds_and_retrieves() {
    let tracker = AuditTracker::new(10);
    let session = SessionHandle::generate();

    tracker.log(AuditRecord::new(AuditEventType::SessionInit, session, "keygen session started").party(PartyId(1)));

    let recent = tracker.recent(1);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].session, session);
    assert_eq!(recent[0].party, Some(PartyId(1)));
    assert_eq!(recent[0].message, "keygen session started");
    assert!(chrono::DateTime::parse_from_rfc3339(&recent[0].timestamp).is_ok());
}

#[test]
fn test_audit_log_eviction() {
    let tracker = AuditTracker::new(3);
    let session = SessionHandle::generate();

    for round in 0..5 {
        tracker.log(AuditRecord::new(AuditEventType::RoundAdvanced, session, format!("round {round}")).round(round));
    }

    let recent = tracker.recent(5);
    assert_eq!(recent.len(), 3); // oldest two evicted
    assert_eq!(recent[0].round, Some(4));
    assert_eq!(recent[2].round, Some(2));
}

#[test]
fn test_audit_log_filters_by_session() {
    let tracker = AuditTracker::new(10);
    let (a, b) = (SessionHandle::generate(), SessionHandle::generate());

    tracker.log(AuditRecord::new(AuditEventType::SessionInit, a, "a"));
    tracker.log(AuditRecord::new(AuditEventType::SessionInit, b, "b"));
    tracker.log(AuditRecord::new(AuditEventType::Destroyed, a, "a gone"));

    let events: Vec<_> = tracker.for_session(a).into_iter().map(|r| r.event_type).collect();
    assert_eq!(events, vec![AuditEventType::SessionInit, AuditEventType::Destroyed]);
}

#[test]
fn test_zero_capacity_keeps_nothing() {
    let tracker = AuditTracker::new(0);
    tracker.log(AuditRecord::new(AuditEventType::Failed, SessionHandle::generate(), "boom"));
    assert!(tracker.is_empty());
}

#[test]
fn test_audit_log_thread_safety() {
    let tracker = AuditTracker::new(100);

    thread::scope(|s| {
        for i in 0..10 {
            let tracker = &tracker;
            s.spawn(move || {
                tracker.log(
                    AuditRecord::new(AuditEventType::RoundAdvanced, SessionHandle::generate(), format!("thread {i}"))
                        .party(PartyId(i + 1)),
                );
            });
        }
    });

    assert_eq!(tracker.len(), 10);
}
