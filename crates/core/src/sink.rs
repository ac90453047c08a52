//! Collaborator traits: where finished records and cycle summaries go.

use std::sync::Mutex;

use crate::error::SinkError;
use crate::record::StoredError;

/// Storage for finished error records.
///
/// Retry policy belongs to the implementation; the scan cycle calls
/// `insert` at most once per record and only logs failures.
pub trait ErrorSink: Send + Sync {
    /// Sink name, used in logs
    fn name(&self) -> &str;

    /// Stores one record
    fn insert(&self, error: &StoredError) -> Result<(), SinkError>;
}

/// Receives the aggregated error text of one scan cycle.
pub trait Notifier: Send + Sync {
    /// Notifier name, used in logs
    fn name(&self) -> &str;

    /// Delivers the text blob. Never called with empty text.
    fn notify(&self, hostname: &str, text: &str) -> Result<(), SinkError>;
}

/// In-memory sink, handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    errors: Mutex<Vec<StoredError>>,
    notifications: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored records, in insertion order.
    pub fn errors(&self) -> Vec<StoredError> {
        self.errors
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Snapshot of delivered notifications.
    pub fn notifications(&self) -> Vec<String> {
        self.notifications
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ErrorSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn insert(&self, error: &StoredError) -> Result<(), SinkError> {
        let mut guard = self.errors.lock().map_err(|e| SinkError::Write {
            target: "memory".to_owned(),
            reason: e.to_string(),
        })?;
        guard.push(error.clone());
        Ok(())
    }
}

impl Notifier for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn notify(&self, _hostname: &str, text: &str) -> Result<(), SinkError> {
        let mut guard = self.notifications.lock().map_err(|e| SinkError::Write {
            target: "memory".to_owned(),
            reason: e.to_string(),
        })?;
        guard.push(text.to_owned());
        Ok(())
    }
}
