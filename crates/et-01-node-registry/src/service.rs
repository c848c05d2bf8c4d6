//! Node Registry Service

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use shared_types::{
    EventKind, EventRecord, EventSink, NodeId, NodeRole, TimeSource, ValidationError,
};
use tracing::{debug, info, warn};

use crate::domain::{LivenessConfig, LivenessCounts, NodeEntry, NodeStatus};
use crate::error::RegistryResult;
use crate::ports::inbound::{HeartbeatOutcome, NodeRegistryApi, Registration};

/// Roster of nodes with per-node serialization.
///
/// The outer map is write-locked only when the roster changes; heartbeats
/// clone the entry handle under a read lock and then lock just that node.
pub struct NodeRegistryService {
    config: LivenessConfig,
    nodes: RwLock<HashMap<NodeId, Arc<Mutex<NodeEntry>>>>,
    clock: Arc<dyn TimeSource>,
    events: Arc<dyn EventSink>,
}

impl NodeRegistryService {
    pub fn new(
        config: LivenessConfig,
        clock: Arc<dyn TimeSource>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            nodes: RwLock::new(HashMap::new()),
            clock,
            events,
        }
    }

    #[must_use]
    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn entry(&self, node_id: &NodeId) -> Option<Arc<Mutex<NodeEntry>>> {
        self.nodes.read().get(node_id).cloned()
    }

    fn record_admin(&self, detail: serde_json::Value, node_id: Option<&NodeId>) {
        let mut record =
            EventRecord::new(self.clock.now(), EventKind::AdminAction).with_detail(detail);
        if let Some(node_id) = node_id {
            record = record.with_node(node_id.clone());
        }
        self.events.append(record);
    }
}

impl NodeRegistryApi for NodeRegistryService {
    fn register(&self, node_id: NodeId, role: NodeRole) -> RegistryResult<Registration> {
        let mut nodes = self.nodes.write();
        if let Some(existing) = nodes.get(&node_id) {
            let existing_role = existing.lock().role;
            if existing_role != role {
                warn!(
                    node = %node_id,
                    existing = %existing_role,
                    requested = %role,
                    "[et-01] Registration rejected: role conflict"
                );
                return Err(ValidationError::RoleConflict {
                    node_id,
                    existing: existing_role,
                    requested: role,
                }
                .into());
            }
            return Ok(Registration::Existing);
        }

        info!(node = %node_id, %role, "[et-01] Node registered");
        let entry = NodeEntry::new(node_id.clone(), role, self.clock.now());
        nodes.insert(node_id, Arc::new(Mutex::new(entry)));
        Ok(Registration::Created)
    }

    fn record_heartbeat(&self, node_id: &NodeId, sent_at: DateTime<Utc>) -> HeartbeatOutcome {
        let Some(entry) = self.entry(node_id) else {
            warn!(node = %node_id, "[et-01] Heartbeat from unknown node ignored");
            return HeartbeatOutcome::UnknownNode;
        };

        // A node clock running ahead must not pin liveness in the future.
        let now = self.clock.now();
        let at = sent_at.min(now);

        let role = {
            let mut node = entry.lock();
            if !node.observe(at) {
                debug!(node = %node_id, %sent_at, "[et-01] Stale or duplicate heartbeat absorbed");
                return HeartbeatOutcome::Duplicate;
            }
            node.role
        };

        self.events.append(
            EventRecord::new(now, EventKind::HeartbeatReceived)
                .with_node(node_id.clone())
                .with_detail(json!({ "role": role, "sent_at": at })),
        );
        HeartbeatOutcome::Accepted
    }

    fn snapshot(&self) -> Vec<NodeStatus> {
        let now = self.clock.now();
        let entries: Vec<_> = self.nodes.read().values().cloned().collect();
        let mut statuses: Vec<NodeStatus> = entries
            .iter()
            .map(|entry| entry.lock().status(now, &self.config))
            .collect();
        statuses.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        statuses
    }

    fn liveness_counts(&self) -> LivenessCounts {
        let mut counts = LivenessCounts::default();
        for status in self.snapshot() {
            counts.add(status.liveness);
        }
        counts
    }

    fn role_of(&self, node_id: &NodeId) -> Option<NodeRole> {
        self.entry(node_id).map(|entry| entry.lock().role)
    }

    fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeId> {
        let entries: Vec<_> = self.nodes.read().values().cloned().collect();
        let mut ids: Vec<NodeId> = entries
            .iter()
            .filter_map(|entry| {
                let node = entry.lock();
                (node.role == role).then(|| node.node_id.clone())
            })
            .collect();
        ids.sort();
        ids
    }

    fn retire(&self, node_id: &NodeId) -> RegistryResult<()> {
        if self.nodes.write().remove(node_id).is_none() {
            return Err(ValidationError::UnknownNode {
                node_id: node_id.clone(),
            }
            .into());
        }
        info!(node = %node_id, "[et-01] Node retired");
        self.record_admin(json!({ "action": "retire_node" }), Some(node_id));
        Ok(())
    }

    fn reset_roster(&self) -> usize {
        let removed = {
            let mut nodes = self.nodes.write();
            let removed = nodes.len();
            nodes.clear();
            removed
        };
        info!(removed, "[et-01] Roster reset");
        self.record_admin(json!({ "action": "reset_roster", "removed": removed }), None);
        removed
    }
}
