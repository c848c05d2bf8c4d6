//! # Integration Scenarios
//!
//! Each module drives the hub end to end: messages in on the bus, state
//! observed through the controller, the event log and outbound topics.

pub mod config_push;
pub mod liveness;
pub mod narrative_unlock;
pub mod resilience;
