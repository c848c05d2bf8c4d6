//! Driven Ports (SPI - Outbound Dependencies)
//!
//! Commands leave through `shared_bus::MessageBus`; events through
//! `shared_types::EventSink`.

use shared_types::{NodeId, NodeRole};

/// Read-only view of the node roster.
///
/// The runtime backs this with the Node Registry.
pub trait NodeDirectory: Send + Sync {
    fn role_of(&self, node_id: &NodeId) -> Option<NodeRole>;

    /// Registered nodes with `role`, ordered by id.
    fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeId>;
}
