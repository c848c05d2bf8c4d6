//! # et-04-event-log
//!
//! Event Log Sink: the append-only record of everything the hub did.
//!
//! ```text
//!  subsystems ──append()──▶ [ query window ] ──query()/summarize()──▶ reporting
//!                      │
//!                      └──▶ mpsc ──▶ [ writer task ] ──spawn_blocking──▶ EventStore (CSV per day)
//! ```
//!
//! `append` never fails and never blocks on storage. Record order is
//! append order, which is also the order in the files.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{CsvFileStore, InMemoryStore};
pub use domain::{EventSummary, EventWindow, RECENT_EVENTS};
pub use error::{EventLogError, EventLogResult};
pub use ports::inbound::EventLogApi;
pub use ports::outbound::EventStore;
pub use service::{EventLogConfig, EventLogSink};
