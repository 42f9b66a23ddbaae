// ABOUTME: In-memory audit sink for tests and embedding.
// ABOUTME: Same chain rules as the file log, nothing persisted.

use parking_lot::Mutex;

use super::{AuditEntry, AuditError, AuditEvent, AuditSink, chain_head};

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    inner: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions recorded so far, oldest first.
    pub fn actions(&self) -> Vec<super::AuditAction> {
        self.inner.lock().iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<AuditEvent, AuditError> {
        let mut guard = self.inner.lock();
        let event = entry.seal(chain_head(&guard));
        guard.push(event.clone());
        Ok(event)
    }

    fn events(&self) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(self.inner.lock().clone())
    }
}
