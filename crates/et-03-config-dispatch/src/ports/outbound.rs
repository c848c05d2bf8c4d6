//! Driven Ports (SPI - Outbound Dependencies)
//!
//! Pushes leave through `shared_bus::MessageBus`; outcomes are recorded
//! through `shared_types::EventSink`.

use shared_types::NodeId;

/// Which nodes may receive a push. Backed by the Node Registry.
pub trait NodeLookup: Send + Sync {
    fn is_registered(&self, node_id: &NodeId) -> bool;
}
