//! Narrative session and its transition function.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_bus::HubStatePayload;
use shared_types::{FragmentId, NodeId, SessionId, ValidationError};

/// Coarse state of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NarrativeState {
    Idle,
    Accumulating,
    Unlocked,
}

/// What one trigger did to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerDecision {
    /// New fragment; threshold not reached yet.
    Added { unique: usize },
    /// Fragment already counted. `replay` marks a redelivery of the same
    /// trigger (same node, fragment and send time).
    Repeat { unique: usize, replay: bool },
    /// This trigger took the session to the threshold.
    Unlocked { unique: usize },
}

/// Accumulation state for one content pack.
#[derive(Clone, Debug)]
pub struct NarrativeSession {
    session_id: SessionId,
    threshold: usize,
    participants: Option<BTreeSet<NodeId>>,
    triggered: BTreeSet<FragmentId>,
    /// Latest send time seen per (node, fragment), to spot redeliveries.
    last_seen: HashMap<(NodeId, FragmentId), DateTime<Utc>>,
    unlocked_at: Option<DateTime<Utc>>,
    activated_at: DateTime<Utc>,
    attempts: u64,
}

impl NarrativeSession {
    pub fn new(
        session_id: SessionId,
        threshold: usize,
        participants: Option<BTreeSet<NodeId>>,
        activated_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if threshold == 0 {
            return Err(ValidationError::invalid_field(
                "threshold",
                "must be at least 1",
            ));
        }
        Ok(Self {
            session_id,
            threshold,
            participants,
            triggered: BTreeSet::new(),
            last_seen: HashMap::new(),
            unlocked_at: None,
            activated_at,
            attempts: 0,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn participants(&self) -> Option<&BTreeSet<NodeId>> {
        self.participants.as_ref()
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }

    #[must_use]
    pub fn unique_count(&self) -> usize {
        self.triggered.len()
    }

    /// Whether `node_id` takes part. Without an explicit list every whisper
    /// node does.
    #[must_use]
    pub fn admits(&self, node_id: &NodeId) -> bool {
        self.participants
            .as_ref()
            .map_or(true, |set| set.contains(node_id))
    }

    #[must_use]
    pub fn state(&self) -> NarrativeState {
        if self.is_unlocked() {
            NarrativeState::Unlocked
        } else if self.triggered.is_empty() {
            NarrativeState::Idle
        } else {
            NarrativeState::Accumulating
        }
    }

    /// Apply one trigger. The caller has already checked node role and
    /// participation.
    pub fn apply_trigger(
        &mut self,
        node_id: &NodeId,
        fragment_id: FragmentId,
        sent_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TriggerDecision, ValidationError> {
        if self.is_unlocked() {
            return Err(ValidationError::AlreadyUnlocked);
        }

        let key = (node_id.clone(), fragment_id.clone());
        let replay = self.last_seen.get(&key).is_some_and(|last| sent_at <= *last);
        if replay {
            return Ok(TriggerDecision::Repeat {
                unique: self.unique_count(),
                replay: true,
            });
        }
        self.last_seen.insert(key, sent_at);
        self.attempts += 1;

        if !self.triggered.insert(fragment_id) {
            return Ok(TriggerDecision::Repeat {
                unique: self.unique_count(),
                replay: false,
            });
        }

        let unique = self.unique_count();
        if unique >= self.threshold {
            self.unlocked_at = Some(now);
            Ok(TriggerDecision::Unlocked { unique })
        } else {
            Ok(TriggerDecision::Added { unique })
        }
    }

    /// Back to `IDLE`; identity, threshold and participants are kept.
    pub fn reset(&mut self) {
        self.triggered.clear();
        self.last_seen.clear();
        self.unlocked_at = None;
        self.attempts = 0;
    }

    #[must_use]
    pub fn snapshot(&self) -> NarrativeSnapshot {
        NarrativeSnapshot {
            session_id: Some(self.session_id.clone()),
            state: self.state(),
            triggered: self.triggered.iter().cloned().collect(),
            unique_count: self.unique_count(),
            threshold: self.threshold,
            unlocked: self.is_unlocked(),
            unlocked_at: self.unlocked_at,
            activated_at: Some(self.activated_at),
            trigger_attempts: self.attempts,
        }
    }
}

/// Read-only view of the session for the dashboard and the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NarrativeSnapshot {
    pub session_id: Option<SessionId>,
    pub state: NarrativeState,
    pub triggered: Vec<FragmentId>,
    pub unique_count: usize,
    pub threshold: usize,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub trigger_attempts: u64,
}

impl NarrativeSnapshot {
    /// Snapshot when no session has been activated.
    #[must_use]
    pub fn inactive(threshold: usize) -> Self {
        Self {
            session_id: None,
            state: NarrativeState::Idle,
            triggered: Vec::new(),
            unique_count: 0,
            threshold,
            unlocked: false,
            unlocked_at: None,
            activated_at: None,
            trigger_attempts: 0,
        }
    }

    #[must_use]
    pub fn to_hub_state(&self) -> HubStatePayload {
        HubStatePayload {
            session_id: self.session_id.clone(),
            unlocked: self.unlocked,
            triggered: self.triggered.clone(),
            threshold: self.threshold,
        }
    }
}
