use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};

use crate::audit::{AuditEventType, AuditRecord, AuditTracker};
use crate::config::RouterConfig;
use crate::envelope::EnvelopeFormat;
use crate::error::RouterError;
use crate::protocol::{ProtocolDescriptor, ProtocolParams};
use crate::round_engine::RoundEngine;
use crate::session::{InboundBatch, RoundOutput, Session};
use crate::types::{SessionHandle, SessionState};

/// Owns every live session and maps opaque handles to them.
///
/// The handle table is only locked long enough to clone a session out of it,
/// so `advance` calls on distinct sessions run in parallel. Each session sits
/// behind its own mutex, which serializes calls on the same handle.
///
/// Handles carry the registry's origin and a sequence number, so a destroyed
/// handle is told apart from a never-issued one without remembering it.
pub struct SessionRegistry {
    engine: Arc<dyn RoundEngine>,
    format: EnvelopeFormat,
    max_parties: usize,
    sessions: RwLock<HashMap<SessionHandle, Arc<Mutex<Session>>>>,
    origin: u64,
    /// Next sequence number to issue.
    issued: AtomicU64,
    audit: AuditTracker,
}

impl SessionRegistry {
    /// Registry with default configuration
    pub fn new(engine: Arc<dyn RoundEngine>) -> Self {
        Self::with_config(engine, &RouterConfig::default())
    }

    pub fn with_config(engine: Arc<dyn RoundEngine>, config: &RouterConfig) -> Self {
        SessionRegistry {
            engine,
            format: config.envelope_format,
            max_parties: config.max_parties,
            sessions: RwLock::new(HashMap::new()),
            origin: rand::random(),
            issued: AtomicU64::new(0),
            audit: AuditTracker::new(config.audit_capacity),
        }
    }

    /// Create a session and return its handle.
    pub fn init(&self, params: ProtocolParams) -> Result<SessionHandle, RouterError> {
        let handle = SessionHandle::sequenced(self.origin, self.issued.fetch_add(1, Ordering::SeqCst));
        let party = params.party_id;
        let kind = params.kind;

        let session = Session::init(handle, Arc::clone(&self.engine), params, self.max_parties).map_err(|err| {
            warn!(party = %party, %kind, error = %err, "session init rejected");
            err
        })?;

        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle, Arc::new(Mutex::new(session)));

        self.audit.log(
            AuditRecord::new(AuditEventType::SessionInit, handle, format!("{kind} session started"))
                .party(party),
        );
        info!(%handle, party = %party, %kind, "session registered");
        Ok(handle)
    }

    /// Run the next round of `handle`'s session.
    pub fn advance(&self, handle: SessionHandle, batch: &InboundBatch) -> Result<RoundOutput, RouterError> {
        let entry = self.lookup(handle)?;
        let mut session = lock_session(&entry)?;

        let result = session.advance(batch);
        let party = session.party_id();
        match &result {
            Ok(output) => {
                let event = if session.state() == SessionState::Completed {
                    AuditEventType::Completed
                } else {
                    AuditEventType::RoundAdvanced
                };
                let message = if output.is_final() {
                    format!("round {} produced final material", session.round())
                } else {
                    format!("round {} produced {} outbound bytes", session.round(), output.bytes().len())
                };
                self.audit.log(
                    AuditRecord::new(event, handle, message)
                        .party(party)
                        .round(session.round()),
                );
            }
            Err(RouterError::SessionTerminated { .. }) => {}
            Err(err) => {
                self.audit.log(
                    AuditRecord::new(AuditEventType::Failed, handle, err.to_string())
                        .party(party)
                        .round(batch.round()),
                );
            }
        }
        result
    }

    /// Release the session's engine handle and forget the session.
    ///
    /// Destroying a handle twice is a no-op; a handle this registry never
    /// issued is `InvalidHandle`.
    pub fn destroy(&self, handle: SessionHandle) -> Result<(), RouterError> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle);

        let Some(entry) = removed else {
            if self.was_issued(handle) {
                debug!(%handle, "session already destroyed");
                return Ok(());
            }
            return Err(RouterError::InvalidHandle(handle));
        };

        // Waits for an in-flight advance on this handle to return.
        let mut session = entry.lock().unwrap_or_else(|e| e.into_inner());
        let party = session.party_id();
        let prior = session.state();
        session.destroy();

        self.audit.log(
            AuditRecord::new(AuditEventType::Destroyed, handle, format!("destroyed from {prior}")).party(party),
        );
        Ok(())
    }

    pub fn state(&self, handle: SessionHandle) -> Result<SessionState, RouterError> {
        let session = self.lookup(handle)?;
        Ok(lock_session(&session)?.state())
    }

    /// Last round the session completed; 0 before the first.
    pub fn round(&self, handle: SessionHandle) -> Result<u32, RouterError> {
        let session = self.lookup(handle)?;
        Ok(lock_session(&session)?.round())
    }

    pub fn descriptor(&self, handle: SessionHandle) -> Result<ProtocolDescriptor, RouterError> {
        let session = self.lookup(handle)?;
        Ok(lock_session(&session)?.descriptor())
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Engine every session of this registry runs on.
    pub fn engine(&self) -> &Arc<dyn RoundEngine> {
        &self.engine
    }

    /// Envelope convention the registry's engine speaks.
    pub fn format(&self) -> EnvelopeFormat {
        self.format
    }

    pub fn audit(&self) -> &AuditTracker {
        &self.audit
    }

    fn was_issued(&self, handle: SessionHandle) -> bool {
        handle
            .sequence_under(self.origin)
            .is_some_and(|seq| seq < self.issued.load(Ordering::SeqCst))
    }

    fn lookup(&self, handle: SessionHandle) -> Result<Arc<Mutex<Session>>, RouterError> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&handle)
            .cloned()
            .ok_or(RouterError::InvalidHandle(handle))
    }
}

/// A session whose lock was poisoned panicked mid-round; treat it as failed.
fn lock_session(session: &Mutex<Session>) -> Result<MutexGuard<'_, Session>, RouterError> {
    session.lock().map_err(|_| RouterError::SessionTerminated {
        state: SessionState::Failed,
    })
}
