//! In-memory store for tests and for running without a logs directory.

use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::EventRecord;

use crate::error::EventLogResult;
use crate::ports::outbound::EventStore;

/// Keeps everything it is given. Clones share the same records, so a test
/// can keep a handle after moving the store into the sink.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with history, as if loaded from disk.
    #[must_use]
    pub fn with_history(records: Vec<EventRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }
}

impl EventStore for InMemoryStore {
    fn append(&mut self, record: &EventRecord) -> EventLogResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> EventLogResult<()> {
        Ok(())
    }

    fn load_latest(&self) -> EventLogResult<Vec<EventRecord>> {
        Ok(self.records())
    }
}
