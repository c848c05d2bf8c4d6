//! # et-01-node-registry
//!
//! Node Registry: the roster of installation devices and their liveness.
//!
//! ## Overview
//!
//! - **Static roster**: nodes are registered at startup from configuration;
//!   heartbeats never create nodes.
//! - **Monotonic heartbeats**: a heartbeat older than (or equal to) the last
//!   recorded one for that node is absorbed as a duplicate.
//! - **Derived liveness**: `online`/`stale`/`offline` is computed from the
//!   age of the last heartbeat at snapshot time, never stored.
//!
//! ```text
//!            age < interval          interval ≤ age < factor×interval     otherwise
//! ──────────────[ ONLINE ]──────────────────[ STALE ]────────────────────[ OFFLINE ]──▶ age
//! ```
//!
//! ## Concurrency
//!
//! Each node entry sits behind its own lock; the roster map is only
//! write-locked by registration and administrative removal. Snapshots take
//! read locks and run alongside heartbeat writes.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{LivenessConfig, LivenessCounts, NodeEntry, NodeStatus};
pub use error::{RegistryError, RegistryResult};
pub use ports::inbound::{HeartbeatOutcome, NodeRegistryApi, Registration};
pub use service::NodeRegistryService;
