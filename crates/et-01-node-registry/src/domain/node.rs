//! Roster entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::{LivenessClass, NodeId, NodeRole};

use super::liveness::LivenessConfig;

/// One registered device. Mutated only by the registry service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeEntry {
    pub node_id: NodeId,
    pub role: NodeRole,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub heartbeats: u64,
}

impl NodeEntry {
    pub fn new(node_id: NodeId, role: NodeRole, registered_at: DateTime<Utc>) -> Self {
        Self {
            node_id,
            role,
            registered_at,
            last_heartbeat: None,
            heartbeats: 0,
        }
    }

    /// Record a heartbeat if it is strictly newer than the last one.
    ///
    /// Returns `false` for an older or equal timestamp.
    pub fn observe(&mut self, at: DateTime<Utc>) -> bool {
        if self.last_heartbeat.is_some_and(|last| at <= last) {
            return false;
        }
        self.last_heartbeat = Some(at);
        self.heartbeats += 1;
        true
    }

    /// Public view at `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>, config: &LivenessConfig) -> NodeStatus {
        // A heartbeat stamped ahead of `now` counts as brand new.
        let age = self
            .last_heartbeat
            .map(|last| (now - last).to_std().unwrap_or_default());
        NodeStatus {
            node_id: self.node_id.clone(),
            role: self.role,
            last_heartbeat: self.last_heartbeat,
            age_seconds: age.map(|a| a.as_secs_f64()),
            liveness: config.classify(age),
            heartbeats: self.heartbeats,
        }
    }
}

/// Liveness view of one node, as reported to the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub role: NodeRole,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub age_seconds: Option<f64>,
    pub liveness: LivenessClass,
    pub heartbeats: u64,
}
