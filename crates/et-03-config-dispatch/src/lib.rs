//! # et-03-config-dispatch
//!
//! Config Dispatcher: pushes configuration and accessibility payloads to
//! nodes and tracks whether each node applied them.
//!
//! ## Push lifecycle
//!
//! ```text
//!                      ack (same correlation id, same node)
//!            ┌──────────────────────────────────────────────▶ [ ACKED ]
//!            │
//! push ──▶ [ PENDING ] ── ack_timeout elapsed ──────────────▶ [ TIMED_OUT ]
//!            │
//!            └── newer push to the same node ───────────────▶ [ SUPERSEDED ]
//! ```
//!
//! Every arrow is one-way. A push whose publish fails never becomes
//! pending. Exactly one of `config_push_ok` / `config_push_timeout` is
//! recorded per correlation id that reaches `ACKED` or `TIMED_OUT`; a
//! superseded request records neither. No automatic retry.
//!
//! ## Payloads
//!
//! [`NodeConfigPayload`] is the validated schema pushed to nodes.
//! [`AccessibilityProfile`] layers presets and per-node overrides and can
//! diff two profiles to find which nodes need a new push.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{
    AccessibilityProfile, AccessibilitySettings, AudioSettings, NodeConfigPayload, ProfileBaselines,
    ProximitySettings, PushRecord, PushStatus, PushTicket, MAX_EXTENSIONS,
};
pub use error::{DispatchError, DispatchResult};
pub use ports::inbound::{AckOutcome, ConfigDispatchApi, PushOutcome};
pub use ports::outbound::NodeLookup;
pub use service::{ConfigDispatcher, DispatchConfig};
