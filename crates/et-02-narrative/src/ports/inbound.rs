//! Driving Ports (API - Inbound)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{FragmentId, NodeId, SessionId};

use crate::domain::NarrativeSnapshot;
use crate::error::NarrativeResult;

/// Result of an accepted trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// New fragment counted.
    Accepted { unique: usize },
    /// Fragment already counted; the unique count did not change.
    Duplicate { unique: usize },
    /// This trigger unlocked the session.
    Unlocked { unique: usize },
}

/// Primary Narrative API
#[async_trait]
pub trait NarrativeApi: Send + Sync {
    /// Create or replace the active session.
    ///
    /// Idempotent for the same id, threshold and participants; otherwise the
    /// new session starts empty.
    async fn activate(
        &self,
        session_id: SessionId,
        threshold: usize,
        participants: Option<Vec<NodeId>>,
    ) -> NarrativeResult<()>;

    /// Count a fragment trigger from a whisper node.
    async fn on_fragment_triggered(
        &self,
        node_id: &NodeId,
        fragment_id: FragmentId,
        sent_at: DateTime<Utc>,
    ) -> NarrativeResult<TriggerOutcome>;

    /// Clear the triggered set and the unlocked flag. The only way out of
    /// `UNLOCKED`.
    async fn reset(&self) -> NarrativeResult<()>;

    fn snapshot(&self) -> NarrativeSnapshot;
}
