//! Ports for the Narrative State Machine

pub mod inbound;
pub mod outbound;
