//! Driving Ports (API - Inbound)
//!
//! Writes arrive through `shared_types::EventSink`; this is the read side.

use chrono::{DateTime, Utc};
use shared_types::EventRecord;

use crate::domain::EventSummary;

/// Query API used by reporting.
pub trait EventLogApi: Send + Sync {
    /// The most recent `limit` records at or after `since`, oldest first.
    fn query(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<EventRecord>;

    /// Derived metrics over the records at or after `since`.
    fn summarize(&self, since: Option<DateTime<Utc>>) -> EventSummary;

    /// Records appended since the sink started.
    fn total_recorded(&self) -> u64;
}
