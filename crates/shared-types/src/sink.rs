//! # Event Sink Port
//!
//! The outbound port every subsystem uses to record what it did. Appending
//! never fails from the caller's point of view; implementations swallow and
//! log their own storage errors.

use crate::events::EventRecord;

/// Append-only destination for event records.
pub trait EventSink: Send + Sync {
    /// Record an event. Must not block on storage.
    fn append(&self, record: EventRecord);
}

/// Sink that keeps every record in memory, for assertions in tests.
///
/// Enable with the `test-utils` feature flag.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: parking_lot::Mutex<Vec<EventRecord>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    /// Number of records of the given kind.
    pub fn count(&self, kind: crate::events::EventKind) -> usize {
        self.records.lock().iter().filter(|r| r.kind == kind).count()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl EventSink for RecordingSink {
    fn append(&self, record: EventRecord) {
        self.records.lock().push(record);
    }
}
