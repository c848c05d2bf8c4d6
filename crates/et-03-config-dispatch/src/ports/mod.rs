//! Ports for the Config Dispatcher

pub mod inbound;
pub mod outbound;
