//! Driving Ports (API - Inbound)

use async_trait::async_trait;
use shared_bus::ConfigAck;
use shared_types::{CorrelationId, NodeId};

use crate::domain::{NodeConfigPayload, PushRecord, PushStatus, PushTicket};
use crate::error::DispatchResult;

/// What an acknowledgement did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// Matched the pending request; it is now `Acked`.
    Acked,
    /// The request had already reached this terminal status.
    Stale(PushStatus),
    /// No request with that id for that node.
    Unknown,
}

/// Per-node result of a push.
pub type PushOutcome = (NodeId, DispatchResult<PushTicket>);

/// Primary Config Dispatch API
#[async_trait]
pub trait ConfigDispatchApi: Send + Sync {
    /// Push `payload` to every node in `node_ids`, each independently.
    ///
    /// Duplicate ids are pushed once. Results follow input order.
    async fn push(&self, node_ids: &[NodeId], payload: &NodeConfigPayload) -> Vec<PushOutcome>;

    /// Resolve the pending request matching this ack, if any.
    async fn on_ack(&self, ack: &ConfigAck) -> AckOutcome;

    /// Wait until the request is terminal, bounded by the ack timeout plus
    /// a grace interval. Returns `Pending` if the bound elapses first.
    async fn wait_for(&self, correlation_id: CorrelationId) -> DispatchResult<PushStatus>;

    fn status(&self, correlation_id: &CorrelationId) -> Option<PushRecord>;

    fn pending_count(&self) -> usize;

    /// Forget a node that left the roster: its pending push, if any, is
    /// cancelled without an event and its slot is dropped.
    async fn release(&self, node_id: &NodeId);

    /// Cancel every timer and forget pending requests without emitting
    /// events. Later pushes fail with `ShuttingDown`.
    async fn shutdown(&self);
}
