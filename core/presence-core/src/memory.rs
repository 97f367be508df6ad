//! In-memory collaborators.
//!
//! Useful for embedding the tracker where presence lives in-process, and as
//! the observation point in tests. Each one can be told to fail so error
//! containment can be exercised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::collaborators::{AuditRecord, AuditSink, Notice, Notifier, PresenceStore};
use crate::error::CollaboratorError;
use crate::types::Phase;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryPresenceStore {
    current: Mutex<Option<Phase>>,
    history: Mutex<Vec<Phase>>,
    failing: AtomicBool,
    panicking: AtomicBool,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent `set_presence` returns an error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every subsequent `set_presence` panics.
    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }

    /// Statuses successfully written, oldest first.
    pub fn history(&self) -> Vec<Phase> {
        lock(&self.history).clone()
    }
}

impl PresenceStore for MemoryPresenceStore {
    fn set_presence(&self, status: Phase) -> Result<(), CollaboratorError> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("presence store exploded while setting {status}");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable(
                "presence store offline".to_string(),
            ));
        }
        *lock(&self.current) = Some(status);
        lock(&self.history).push(status);
        Ok(())
    }

    fn presence(&self) -> Result<Option<Phase>, CollaboratorError> {
        Ok(*lock(&self.current))
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        lock(&self.records).clone()
    }

    pub fn records_with_action(&self, action: &str) -> Vec<AuditRecord> {
        lock(&self.records)
            .iter()
            .filter(|record| record.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn write(&self, record: &AuditRecord) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected("audit sink refused write".to_string()));
        }
        lock(&self.records).push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn show(&self, notice: &Notice) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("no notice surface".to_string()));
        }
        lock(&self.notices).push(notice.clone());
        Ok(())
    }
}
