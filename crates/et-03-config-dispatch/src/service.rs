//! Config Dispatcher service
//!
//! Each node has one slot guarded by an async mutex. A push publishes while
//! holding the slot, so an ack for the new correlation id cannot be handled
//! before the request is recorded as pending. The ack handler and the timer
//! both claim the terminal status under the same slot lock; whichever gets
//! there first wins and the other finds nothing to resolve.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_bus::{ConfigAck, MessageBus, OutboundCommand};
use shared_types::{
    CorrelationId, EventKind, EventRecord, EventSink, NodeId, TimeSource, ValidationError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{AuditTable, NodeConfigPayload, PushRecord, PushStatus, PushTicket};
use crate::error::{DispatchError, DispatchResult};
use crate::ports::inbound::{AckOutcome, ConfigDispatchApi, PushOutcome};
use crate::ports::outbound::NodeLookup;

/// Dispatcher configuration
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// How long a node has to acknowledge a push.
    pub ack_timeout: Duration,
    /// Extra time `wait_for` allows past the ack timeout.
    pub wait_grace: Duration,
    /// Resolved requests kept for audit.
    pub audit_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
            wait_grace: Duration::from_millis(500),
            audit_capacity: 256,
        }
    }
}

struct Pending {
    correlation_id: CorrelationId,
    sent_at: DateTime<Utc>,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    pending: Option<Pending>,
}

type SlotHandle = Arc<tokio::sync::Mutex<Slot>>;

struct Inner {
    config: DispatchConfig,
    slots: Mutex<HashMap<NodeId, SlotHandle>>,
    audit: Mutex<AuditTable>,
    shutting_down: AtomicBool,
    lookup: Arc<dyn NodeLookup>,
    bus: Arc<dyn MessageBus>,
    clock: Arc<dyn TimeSource>,
    events: Arc<dyn EventSink>,
}

/// Config Dispatcher service. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConfigDispatcher {
    inner: Arc<Inner>,
}

impl ConfigDispatcher {
    pub fn new(
        config: DispatchConfig,
        lookup: Arc<dyn NodeLookup>,
        bus: Arc<dyn MessageBus>,
        clock: Arc<dyn TimeSource>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let audit = AuditTable::new(config.audit_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                slots: Mutex::new(HashMap::new()),
                audit: Mutex::new(audit),
                shutting_down: AtomicBool::new(false),
                lookup,
                bus,
                clock,
                events,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Nodes with a slot, pending or idle.
    #[must_use]
    pub fn tracked_nodes(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Most recent requests first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<PushRecord> {
        self.inner.audit.lock().recent(limit)
    }

    /// Push, then wait for every published request to resolve.
    pub async fn push_and_wait(
        &self,
        node_ids: &[NodeId],
        payload: &NodeConfigPayload,
    ) -> Vec<(NodeId, DispatchResult<PushStatus>)> {
        let pushed = self.push(node_ids, payload).await;
        let waits = pushed.into_iter().map(|(node_id, result)| async move {
            let status = match result {
                Ok(ticket) => self.wait_for(ticket.correlation_id).await,
                Err(e) => Err(e),
            };
            (node_id, status)
        });
        join_all(waits).await
    }
}

impl Inner {
    fn slot(&self, node_id: &NodeId) -> SlotHandle {
        Arc::clone(self.slots.lock().entry(node_id.clone()).or_default())
    }

    fn existing_slot(&self, node_id: &NodeId) -> Option<SlotHandle> {
        self.slots.lock().get(node_id).cloned()
    }

    fn deadline(&self, sent_at: DateTime<Utc>) -> DateTime<Utc> {
        let millis = i64::try_from(self.config.ack_timeout.as_millis()).unwrap_or(i64::MAX);
        sent_at
            .checked_add_signed(chrono::Duration::milliseconds(millis))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    async fn push_one(self: &Arc<Self>, node_id: NodeId, payload: Value) -> DispatchResult<PushTicket> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(DispatchError::ShuttingDown);
        }
        if !self.lookup.is_registered(&node_id) {
            debug!(node = %node_id, "[et-03] Push to unregistered node rejected");
            return Err(ValidationError::UnknownNode { node_id }.into());
        }

        let handle = self.slot(&node_id);
        let mut slot = handle.lock().await;
        // Shutdown may have drained the slots while we waited.
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(DispatchError::ShuttingDown);
        }
        // So may a retire; don't leave a slot behind for a departed node.
        if !self.lookup.is_registered(&node_id) {
            let mut slots = self.slots.lock();
            if slots.get(&node_id).is_some_and(|s| Arc::ptr_eq(s, &handle)) {
                slots.remove(&node_id);
            }
            return Err(ValidationError::UnknownNode { node_id }.into());
        }

        let correlation_id = CorrelationId::new();
        let command = OutboundCommand::ConfigPush {
            node_id: node_id.clone(),
            correlation_id,
            payload,
        };
        if let Err(e) = self.bus.publish(command.encode()).await {
            warn!(node = %node_id, error = %e, "[et-03] Config push not published");
            return Err(e.into());
        }

        let sent_at = self.clock.now();
        let ticket = PushTicket {
            node_id,
            correlation_id,
            sent_at,
            deadline: self.deadline(sent_at),
        };
        {
            let mut audit = self.audit.lock();
            if let Some(old) = slot.pending.take() {
                old.timer.abort();
                audit.resolve(&old.correlation_id, PushStatus::Superseded, sent_at);
                info!(
                    node = %ticket.node_id,
                    old = %old.correlation_id,
                    new = %correlation_id,
                    "[et-03] Pending push superseded"
                );
            }
            audit.insert_pending(&ticket);
        }

        let timer = tokio::spawn(Arc::clone(self).expire_after(ticket.node_id.clone(), correlation_id));
        slot.pending = Some(Pending {
            correlation_id,
            sent_at,
            timer,
        });
        info!(node = %ticket.node_id, correlation = %correlation_id, "[et-03] Config push sent");
        Ok(ticket)
    }

    async fn expire_after(self: Arc<Self>, node_id: NodeId, correlation_id: CorrelationId) {
        tokio::time::sleep(self.config.ack_timeout).await;

        let Some(handle) = self.existing_slot(&node_id) else {
            return;
        };
        let mut slot = handle.lock().await;
        if slot.pending.as_ref().map(|p| p.correlation_id) != Some(correlation_id) {
            return;
        }
        slot.pending = None;

        let now = self.clock.now();
        if self
            .audit
            .lock()
            .resolve(&correlation_id, PushStatus::TimedOut, now)
            .is_some()
        {
            self.events.append(
                EventRecord::new(now, EventKind::ConfigPushTimeout)
                    .with_node(node_id.clone())
                    .with_detail(json!({
                        "correlation_id": correlation_id,
                        "timeout_ms": u64::try_from(self.config.ack_timeout.as_millis()).unwrap_or(u64::MAX),
                    })),
            );
            warn!(node = %node_id, correlation = %correlation_id, "[et-03] Config push timed out");
        }
    }
}

#[async_trait]
impl ConfigDispatchApi for ConfigDispatcher {
    async fn push(&self, node_ids: &[NodeId], payload: &NodeConfigPayload) -> Vec<PushOutcome> {
        let mut seen = HashSet::new();
        let targets: Vec<NodeId> = node_ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();

        if let Err(e) = payload.validate() {
            debug!(error = %e, "[et-03] Invalid payload, nothing pushed");
            return targets
                .into_iter()
                .map(|id| (id, Err(e.clone().into())))
                .collect();
        }

        let value = payload.to_value();
        let results = join_all(
            targets
                .iter()
                .map(|id| self.inner.push_one(id.clone(), value.clone())),
        )
        .await;
        targets.into_iter().zip(results).collect()
    }

    async fn on_ack(&self, ack: &ConfigAck) -> AckOutcome {
        let inner = &self.inner;
        if let Some(handle) = inner.existing_slot(&ack.node_id) {
            let mut slot = handle.lock().await;
            let matches = slot
                .pending
                .as_ref()
                .is_some_and(|p| p.correlation_id == ack.correlation_id);
            let claimed = if matches { slot.pending.take() } else { None };
            if let Some(pending) = claimed {
                pending.timer.abort();
                let now = inner.clock.now();
                inner
                    .audit
                    .lock()
                    .resolve(&pending.correlation_id, PushStatus::Acked, now);
                let latency_ms = (now - pending.sent_at).num_milliseconds().max(0);
                inner.events.append(
                    EventRecord::new(now, EventKind::ConfigPushOk)
                        .with_node(ack.node_id.clone())
                        .with_detail(json!({
                            "correlation_id": ack.correlation_id,
                            "latency_ms": latency_ms,
                            "status": ack.status,
                            "applied": ack.applied,
                        })),
                );
                info!(node = %ack.node_id, correlation = %ack.correlation_id, latency_ms, "[et-03] Config push acknowledged");
                return AckOutcome::Acked;
            }
        }

        let known = inner
            .audit
            .lock()
            .get(&ack.correlation_id)
            .filter(|record| record.node_id == ack.node_id)
            .map(|record| record.status);
        match known {
            Some(status) => {
                debug!(node = %ack.node_id, correlation = %ack.correlation_id, ?status, "[et-03] Late ack ignored");
                AckOutcome::Stale(status)
            }
            None => {
                warn!(node = %ack.node_id, correlation = %ack.correlation_id, "[et-03] Ack for unknown push ignored");
                AckOutcome::Unknown
            }
        }
    }

    async fn wait_for(&self, correlation_id: CorrelationId) -> DispatchResult<PushStatus> {
        let mut rx = self
            .inner
            .audit
            .lock()
            .watch(&correlation_id)
            .ok_or(DispatchError::UnknownCorrelation(correlation_id))?;
        let bound = self.inner.config.ack_timeout + self.inner.config.wait_grace;

        let waited = tokio::time::timeout(bound, rx.wait_for(PushStatus::is_terminal))
            .await
            .map(|changed| changed.map(|status| *status));
        match waited {
            Ok(Ok(status)) => Ok(status),
            // Sender gone: the entry was evicted or discarded.
            Ok(Err(_)) => {
                let last = *rx.borrow();
                if last.is_terminal() {
                    Ok(last)
                } else if self.inner.shutting_down.load(Ordering::SeqCst) {
                    Err(DispatchError::ShuttingDown)
                } else {
                    Err(DispatchError::UnknownCorrelation(correlation_id))
                }
            }
            Err(_) => Ok(*rx.borrow()),
        }
    }

    fn status(&self, correlation_id: &CorrelationId) -> Option<PushRecord> {
        self.inner.audit.lock().get(correlation_id).cloned()
    }

    fn pending_count(&self) -> usize {
        self.inner.audit.lock().pending_count()
    }

    async fn release(&self, node_id: &NodeId) {
        let Some(handle) = self.inner.slots.lock().remove(node_id) else {
            return;
        };
        let mut slot = handle.lock().await;
        if let Some(pending) = slot.pending.take() {
            pending.timer.abort();
            self.inner.audit.lock().discard(&pending.correlation_id);
            info!(node = %node_id, correlation = %pending.correlation_id, "[et-03] Pending push dropped for released node");
        }
    }

    async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let handles: Vec<SlotHandle> = self.inner.slots.lock().values().cloned().collect();
        let mut cancelled = 0usize;
        for handle in handles {
            let mut slot = handle.lock().await;
            if let Some(pending) = slot.pending.take() {
                pending.timer.abort();
                self.inner.audit.lock().discard(&pending.correlation_id);
                cancelled += 1;
            }
        }
        info!(cancelled, "[et-03] Config dispatcher stopped");
    }
}
