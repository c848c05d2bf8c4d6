//! Narrative Service - the single ordering point for the active session

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use shared_bus::{MessageBus, OutboundCommand, TransportError};
use shared_types::{
    EventKind, EventRecord, EventSink, FragmentId, NodeId, NodeRole, SessionId, TimeSource,
    ValidationError,
};
use tracing::{debug, error, info, warn};

use crate::domain::{NarrativeSession, NarrativeSnapshot, TriggerDecision};
use crate::error::{NarrativeError, NarrativeResult};
use crate::ports::inbound::{NarrativeApi, TriggerOutcome};
use crate::ports::outbound::NodeDirectory;

/// Narrative configuration
#[derive(Clone, Debug)]
pub struct NarrativeConfig {
    /// Threshold reported while no session is active.
    pub default_threshold: usize,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            default_threshold: 4,
        }
    }
}

/// Narrative State Machine service
///
/// Every mutation of the session happens under `session`; events for a
/// transition are appended before the lock is released, so the log order
/// matches the decision order. Bus publishes happen after the lock is
/// dropped.
pub struct NarrativeService {
    config: NarrativeConfig,
    session: Mutex<Option<NarrativeSession>>,
    /// Keeps retained snapshots from overtaking each other.
    publish_gate: tokio::sync::Mutex<()>,
    directory: Arc<dyn NodeDirectory>,
    bus: Arc<dyn MessageBus>,
    clock: Arc<dyn TimeSource>,
    events: Arc<dyn EventSink>,
}

impl NarrativeService {
    pub fn new(
        config: NarrativeConfig,
        directory: Arc<dyn NodeDirectory>,
        bus: Arc<dyn MessageBus>,
        clock: Arc<dyn TimeSource>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            publish_gate: tokio::sync::Mutex::new(()),
            directory,
            bus,
            clock,
            events,
        }
    }

    #[must_use]
    pub fn active_session(&self) -> Option<SessionId> {
        self.session.lock().as_ref().map(|s| s.session_id().clone())
    }

    fn reject(&self, node_id: &NodeId, err: ValidationError) -> NarrativeError {
        debug!(node = %node_id, error = %err, "[et-02] Trigger rejected");
        err.into()
    }

    fn check_sender(&self, node_id: &NodeId) -> Result<(), ValidationError> {
        match self.directory.role_of(node_id) {
            None => Err(ValidationError::UnknownNode {
                node_id: node_id.clone(),
            }),
            Some(NodeRole::Whisper) => Ok(()),
            Some(actual) => Err(ValidationError::WrongRole {
                node_id: node_id.clone(),
                expected: NodeRole::Whisper,
                actual,
            }),
        }
    }

    /// Publish the current snapshot, retained. Failures are only logged.
    async fn publish_state(&self) {
        let _gate = self.publish_gate.lock().await;
        let message = OutboundCommand::HubState(self.snapshot().to_hub_state()).encode();
        if let Err(e) = self.bus.publish(message).await {
            warn!(error = %e, "[et-02] Failed to publish hub state");
        }
    }

    async fn send_unlock(&self, session_id: &SessionId) -> Result<(), TransportError> {
        let targets = self.directory.nodes_with_role(NodeRole::Mystery);
        if targets.is_empty() {
            warn!(session = %session_id, "[et-02] Unlocked but no mystery node is registered");
        }
        let mut first_error = None;
        for node_id in targets {
            let command = OutboundCommand::Unlock {
                node_id: node_id.clone(),
                session_id: session_id.clone(),
            };
            match self.bus.publish(command.encode()).await {
                Ok(()) => info!(node = %node_id, session = %session_id, "[et-02] Unlock command sent"),
                Err(e) => {
                    error!(node = %node_id, error = %e, "[et-02] Unlock command not delivered");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl NarrativeApi for NarrativeService {
    async fn activate(
        &self,
        session_id: SessionId,
        threshold: usize,
        participants: Option<Vec<NodeId>>,
    ) -> NarrativeResult<()> {
        let participants: Option<BTreeSet<NodeId>> =
            participants.map(|list| list.into_iter().collect());
        let now = self.clock.now();
        {
            let mut guard = self.session.lock();
            if let Some(current) = guard.as_ref() {
                if current.session_id() == &session_id
                    && current.threshold() == threshold
                    && current.participants() == participants.as_ref()
                {
                    debug!(session = %session_id, "[et-02] Session already active");
                    return Ok(());
                }
            }
            let session =
                NarrativeSession::new(session_id.clone(), threshold, participants.clone(), now)?;
            *guard = Some(session);
            self.events.append(
                EventRecord::new(now, EventKind::AdminAction).with_detail(json!({
                    "action": "session_activated",
                    "session_id": session_id,
                    "threshold": threshold,
                    "participants": participants,
                })),
            );
        }
        info!(session = %session_id, threshold, "[et-02] Narrative session activated");
        self.publish_state().await;
        Ok(())
    }

    async fn on_fragment_triggered(
        &self,
        node_id: &NodeId,
        fragment_id: FragmentId,
        sent_at: DateTime<Utc>,
    ) -> NarrativeResult<TriggerOutcome> {
        self.check_sender(node_id)
            .map_err(|e| self.reject(node_id, e))?;

        let now = self.clock.now();
        let (decision, session_id) = {
            let mut guard = self.session.lock();
            let session = guard
                .as_mut()
                .ok_or_else(|| self.reject(node_id, ValidationError::NoActiveSession))?;
            if !session.admits(node_id) {
                return Err(self.reject(
                    node_id,
                    ValidationError::NotInSession {
                        node_id: node_id.clone(),
                    },
                ));
            }
            let decision = session
                .apply_trigger(node_id, fragment_id.clone(), sent_at, now)
                .map_err(|e| self.reject(node_id, e))?;

            let (unique, repeat) = match decision {
                TriggerDecision::Repeat { replay: true, .. } => {
                    debug!(node = %node_id, fragment = %fragment_id, "[et-02] Redelivered trigger absorbed");
                    return Ok(TriggerOutcome::Duplicate {
                        unique: session.unique_count(),
                    });
                }
                TriggerDecision::Repeat { unique, .. } => (unique, true),
                TriggerDecision::Added { unique } | TriggerDecision::Unlocked { unique } => {
                    (unique, false)
                }
            };
            self.events.append(
                EventRecord::new(now, EventKind::FragmentTriggered)
                    .with_node(node_id.clone())
                    .with_detail(json!({
                        "session_id": session.session_id(),
                        "fragment_id": fragment_id,
                        "unique_count": unique,
                        "repeat": repeat,
                        "sent_at": sent_at,
                    })),
            );
            if let TriggerDecision::Unlocked { unique } = decision {
                let snapshot = session.snapshot();
                self.events.append(
                    EventRecord::new(now, EventKind::NarrativeUnlocked).with_detail(json!({
                        "session_id": session.session_id(),
                        "unique_count": unique,
                        "threshold": session.threshold(),
                        "fragments": snapshot.triggered,
                        "last_node": node_id,
                    })),
                );
            }
            (decision, session.session_id().clone())
        };

        match decision {
            TriggerDecision::Repeat { unique, .. } => {
                debug!(node = %node_id, fragment = %fragment_id, unique, "[et-02] Repeat fragment");
                Ok(TriggerOutcome::Duplicate { unique })
            }
            TriggerDecision::Added { unique } => {
                info!(node = %node_id, fragment = %fragment_id, unique, "[et-02] Fragment counted");
                self.publish_state().await;
                Ok(TriggerOutcome::Accepted { unique })
            }
            TriggerDecision::Unlocked { unique } => {
                info!(session = %session_id, unique, "[et-02] Narrative unlocked");
                let delivered = self.send_unlock(&session_id).await;
                self.publish_state().await;
                delivered.map_err(|source| NarrativeError::UnlockDelivery {
                    session_id,
                    source,
                })?;
                Ok(TriggerOutcome::Unlocked { unique })
            }
        }
    }

    async fn reset(&self) -> NarrativeResult<()> {
        let now = self.clock.now();
        let session_id = {
            let mut guard = self.session.lock();
            let session = guard.as_mut().ok_or(ValidationError::NoActiveSession)?;
            session.reset();
            self.events.append(
                EventRecord::new(now, EventKind::AdminAction).with_detail(json!({
                    "action": "narrative_reset",
                    "session_id": session.session_id(),
                })),
            );
            session.session_id().clone()
        };
        info!(session = %session_id, "[et-02] Narrative reset");
        self.publish_state().await;
        Ok(())
    }

    fn snapshot(&self) -> NarrativeSnapshot {
        self.session.lock().as_ref().map_or_else(
            || NarrativeSnapshot::inactive(self.config.default_threshold),
            NarrativeSession::snapshot,
        )
    }
}
