//! Driving Ports (API - Inbound)

use chrono::{DateTime, Utc};
use shared_types::{NodeId, NodeRole};

use crate::domain::{LivenessCounts, NodeStatus};
use crate::error::RegistryResult;

/// Result of `register`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// Same id and role were already present; nothing changed.
    Existing,
}

/// Result of `record_heartbeat`. None of these are errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Accepted,
    /// Older or equal to the last recorded heartbeat.
    Duplicate,
    /// Node is not in the roster; heartbeats never create nodes.
    UnknownNode,
}

/// Primary Node Registry API
pub trait NodeRegistryApi: Send + Sync {
    /// Add a node to the roster. Idempotent for the same role.
    fn register(&self, node_id: NodeId, role: NodeRole) -> RegistryResult<Registration>;

    /// Record a heartbeat sent at `sent_at`.
    fn record_heartbeat(&self, node_id: &NodeId, sent_at: DateTime<Utc>) -> HeartbeatOutcome;

    /// Liveness of every registered node, ordered by id.
    fn snapshot(&self) -> Vec<NodeStatus>;

    /// Per-class totals of `snapshot()`.
    fn liveness_counts(&self) -> LivenessCounts;

    fn role_of(&self, node_id: &NodeId) -> Option<NodeRole>;

    /// Registered ids with the given role, ordered by id.
    fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeId>;

    /// Remove one node (administrative).
    fn retire(&self, node_id: &NodeId) -> RegistryResult<()>;

    /// Remove every node (administrative). Returns how many were removed.
    fn reset_roster(&self) -> usize;
}
