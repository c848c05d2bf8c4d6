//! # Shared Types Crate
//!
//! Identifiers, event records and the two ports (`EventSink`, `TimeSource`)
//! shared by every EchoTrace hub subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Validated Identity**: Identifiers are parsed once at the boundary and
//!   can never contain topic wildcards or log separators afterwards.
//! - **Infallible Recording**: Subsystems append events without handling
//!   storage failures; the sink owns that concern.

pub mod entities;
pub mod errors;
pub mod events;
pub mod sink;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use events::{EventKind, EventRecord, LogLineError, LOG_HEADER};
pub use sink::EventSink;
pub use time::{SystemTimeSource, TimeSource};

#[cfg(any(test, feature = "test-utils"))]
pub use sink::RecordingSink;
#[cfg(any(test, feature = "test-utils"))]
pub use time::ManualTimeSource;
