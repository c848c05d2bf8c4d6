//! Driven Ports (SPI - Outbound Dependencies)

use shared_types::EventRecord;

use crate::error::EventLogResult;

/// Durable storage behind the sink.
///
/// Production: `CsvFileStore`
/// Testing: `InMemoryStore`
///
/// Called only from the writer inside `spawn_blocking`, so implementations
/// may block.
pub trait EventStore: Send + 'static {
    fn append(&mut self, record: &EventRecord) -> EventLogResult<()>;

    fn flush(&mut self) -> EventLogResult<()>;

    /// Records from the most recent storage unit, to warm the query window
    /// on restart. Unreadable entries are skipped.
    fn load_latest(&self) -> EventLogResult<Vec<EventRecord>>;
}
