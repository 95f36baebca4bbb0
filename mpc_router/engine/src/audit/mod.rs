use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::types::{PartyId, SessionHandle};

/// Session lifecycle event being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditEventType {
    SessionInit,
    RoundAdvanced,
    Completed,
    Failed,
    Destroyed,
}

impl AuditEventType {
    pub fn label(self) -> &'static str {
        match self {
            AuditEventType::SessionInit => "INIT",
            AuditEventType::RoundAdvanced => "ROUND",
            AuditEventType::Completed => "COMPLETE",
            AuditEventType::Failed => "FAILED",
            AuditEventType::Destroyed => "DESTROY",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Record of one session lifecycle event
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub event_type: AuditEventType,
    pub session: SessionHandle,
    pub party: Option<PartyId>,
    pub round: Option<u32>,
    pub message: String,
    /// RFC3339
    pub timestamp: String,
}

impl AuditRecord {
    pub fn new(event_type: AuditEventType, session: SessionHandle, message: impl Into<String>) -> Self {
        AuditRecord {
            event_type,
            session,
            party: None,
            round: None,
            message: message.into(),
            timestamp: now_rfc3339(),
        }
    }

    pub fn party(mut self, party: PartyId) -> Self {
        self.party = Some(party);
        self
    }

    pub fn round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }
}

/// Bounded in-memory audit trail; the oldest record is evicted first.
pub struct AuditTracker {
    records: Mutex<VecDeque<AuditRecord>>,
    max_entries: usize,
}

impl AuditTracker {
    pub fn new(max_entries: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_entries)),
            max_entries,
        }
    }

    /// Record a new event and mirror it to the tracing output
    pub fn log(&self, record: AuditRecord) {
        info!(
            target: "audit",
            event = %record.event_type,
            session = %record.session,
            party = record.party.map(|p| p.0),
            round = record.round,
            "{}",
            record.message
        );
        if self.max_entries == 0 {
            return;
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.len() == self.max_entries {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Most recent records first
    pub fn recent(&self, count: usize) -> Vec<AuditRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.iter().rev().take(count).cloned().collect()
    }

    /// Every retained record for one session, oldest first
    pub fn for_session(&self, session: SessionHandle) -> Vec<AuditRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.iter().filter(|r| r.session == session).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Current timestamp as an RFC3339 string
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
