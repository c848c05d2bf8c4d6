//! Domain module for the Config Dispatcher
//!
//! - accessibility: settings layers, presets, per-node overrides, diff,
//!   per-node delivery baselines
//! - payload: validated node configuration schema
//! - request: push lifecycle and bounded audit table

pub mod accessibility;
pub mod payload;
pub mod request;

pub use accessibility::{AccessibilityProfile, AccessibilitySettings, ProfileBaselines};
pub use payload::{AudioSettings, NodeConfigPayload, ProximitySettings, MAX_EXTENSIONS};
pub use request::{AuditTable, PushRecord, PushStatus, PushTicket};
