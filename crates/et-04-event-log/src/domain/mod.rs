//! Domain module for the Event Log Sink

pub mod summary;
pub mod window;

pub use summary::{EventSummary, RECENT_EVENTS};
pub use window::EventWindow;
