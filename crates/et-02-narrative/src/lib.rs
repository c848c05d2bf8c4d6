//! # et-02-narrative
//!
//! Narrative State Machine: turns proximity triggers from whisper nodes
//! into a single collective unlock of the mystery node.
//!
//! ## States
//!
//! ```text
//!            first unique fragment            |triggered| ≥ threshold
//! [ IDLE ] ─────────────────────▶ [ ACCUMULATING ] ─────────────────────▶ [ UNLOCKED ]
//!    ▲                                    │                                     │
//!    └────────────────────────── reset() ─┴─────────────────────────────────────┘
//! ```
//!
//! `UNLOCKED` is terminal until `reset()`. The unlock decision is taken
//! under the session lock, so however triggers are duplicated, reordered or
//! delivered concurrently, exactly one `narrative_unlocked` event and one
//! unlock command per mystery node result.
//!
//! ## Outputs
//!
//! | Output | Topic |
//! |--------|-------|
//! | Unlock command | `ECHOTRACE/unlock/<mystery>` |
//! | Session snapshot (retained) | `ECHOTRACE/state/hub` |

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{NarrativeSession, NarrativeSnapshot, NarrativeState, TriggerDecision};
pub use error::{NarrativeError, NarrativeResult};
pub use ports::inbound::{NarrativeApi, TriggerOutcome};
pub use ports::outbound::NodeDirectory;
pub use service::{NarrativeConfig, NarrativeService};
