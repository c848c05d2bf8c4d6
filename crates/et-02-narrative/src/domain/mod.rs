//! Domain module for the Narrative State Machine

pub mod session;

pub use session::{NarrativeSession, NarrativeSnapshot, NarrativeState, TriggerDecision};
