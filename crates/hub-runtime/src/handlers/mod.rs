//! # Event Handlers
//!
//! Bus-facing handlers that feed node traffic into the subsystems.

pub mod inbound;

pub use inbound::{InboundRouter, RouteOutcome, RouterStats};
