//! Config push requests and their audit trail.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::{CorrelationId, NodeId};
use tokio::sync::watch;

/// Lifecycle of one push. Every status except `Pending` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Pending,
    Acked,
    TimedOut,
    /// A newer push to the same node replaced this one before it resolved.
    Superseded,
}

impl PushStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Handle returned for each node a push was published to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PushTicket {
    pub node_id: NodeId,
    pub correlation_id: CorrelationId,
    pub sent_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Audit view of one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PushRecord {
    pub correlation_id: CorrelationId,
    pub node_id: NodeId,
    pub sent_at: DateTime<Utc>,
    pub status: PushStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

struct AuditEntry {
    record: PushRecord,
    status_tx: watch::Sender<PushStatus>,
}

/// Bounded table of recent requests, keyed by correlation id.
///
/// Pending requests are never evicted; resolved ones are dropped oldest
/// first once the table is over capacity.
pub struct AuditTable {
    capacity: usize,
    entries: HashMap<CorrelationId, AuditEntry>,
    order: VecDeque<CorrelationId>,
}

impl AuditTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn insert_pending(&mut self, ticket: &PushTicket) {
        let (status_tx, _) = watch::channel(PushStatus::Pending);
        self.entries.insert(
            ticket.correlation_id,
            AuditEntry {
                record: PushRecord {
                    correlation_id: ticket.correlation_id,
                    node_id: ticket.node_id.clone(),
                    sent_at: ticket.sent_at,
                    status: PushStatus::Pending,
                    resolved_at: None,
                },
                status_tx,
            },
        );
        self.order.push_back(ticket.correlation_id);
        self.evict();
    }

    /// Move a pending request to a terminal status. Returns the updated
    /// record, or `None` if the request is unknown or already terminal.
    pub fn resolve(
        &mut self,
        correlation_id: &CorrelationId,
        status: PushStatus,
        at: DateTime<Utc>,
    ) -> Option<PushRecord> {
        let entry = self.entries.get_mut(correlation_id)?;
        if entry.record.status.is_terminal() {
            return None;
        }
        entry.record.status = status;
        entry.record.resolved_at = Some(at);
        entry.status_tx.send_replace(status);
        let record = entry.record.clone();
        self.evict();
        Some(record)
    }

    /// Forget a request without resolving it.
    pub fn discard(&mut self, correlation_id: &CorrelationId) {
        self.entries.remove(correlation_id);
        self.order.retain(|id| id != correlation_id);
    }

    #[must_use]
    pub fn get(&self, correlation_id: &CorrelationId) -> Option<&PushRecord> {
        self.entries.get(correlation_id).map(|e| &e.record)
    }

    pub fn watch(&self, correlation_id: &CorrelationId) -> Option<watch::Receiver<PushStatus>> {
        self.entries
            .get(correlation_id)
            .map(|e| e.status_tx.subscribe())
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.record.status == PushStatus::Pending)
            .count()
    }

    /// Most recent first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<PushRecord> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.entries.get(id))
            .take(limit)
            .map(|e| e.record.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            let Some(pos) = self.order.iter().position(|id| {
                self.entries
                    .get(id)
                    .map_or(true, |e| e.record.status.is_terminal())
            }) else {
                return;
            };
            if let Some(id) = self.order.remove(pos) {
                self.entries.remove(&id);
            }
        }
    }
}
