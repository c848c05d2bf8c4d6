//! Bounded in-memory window of recent records, in append order.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use shared_types::EventRecord;

#[derive(Debug)]
pub struct EventWindow {
    capacity: usize,
    records: VecDeque<EventRecord>,
}

impl EventWindow {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, record: EventRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = EventRecord>) {
        for record in records {
            self.push(record);
        }
    }

    /// The last `limit` records at or after `since`, oldest first.
    #[must_use]
    pub fn query(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<EventRecord> {
        let mut out: Vec<EventRecord> = self
            .records
            .iter()
            .rev()
            .filter(|r| since.map_or(true, |s| r.timestamp >= s))
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    /// Every record at or after `since`, oldest first.
    pub fn since(&self, since: Option<DateTime<Utc>>) -> impl Iterator<Item = &EventRecord> {
        self.records
            .iter()
            .filter(move |r| since.map_or(true, |s| r.timestamp >= s))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
