//! Domain module for the Node Registry
//!
//! - liveness: age → liveness class
//! - node: roster entry and its public snapshot

pub mod liveness;
pub mod node;

pub use liveness::{LivenessConfig, LivenessCounts};
pub use node::{NodeEntry, NodeStatus};
