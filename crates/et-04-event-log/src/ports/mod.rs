//! Ports for the Event Log Sink

pub mod inbound;
pub mod outbound;
