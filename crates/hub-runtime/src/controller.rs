//! # Hub Controller
//!
//! The dashboard-facing surface. Every operation validates at this boundary
//! before reaching a subsystem.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use et_01_node_registry::{
    LivenessCounts, NodeRegistryApi, NodeStatus, Registration, RegistryError,
};
use et_02_narrative::{NarrativeApi, NarrativeError, NarrativeSnapshot};
use et_03_config_dispatch::{
    AccessibilityProfile, ConfigDispatchApi, DispatchError, NodeConfigPayload, ProfileBaselines,
    PushOutcome, PushRecord, PushStatus,
};
use et_04_event_log::{EventLogApi, EventSummary};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use shared_types::{EventRecord, NodeId, NodeRole, SessionId, ValidationError};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::container::HubContainer;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Narrative(#[from] NarrativeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Dashboard overview.
#[derive(Clone, Debug, Serialize)]
pub struct HubOverview {
    pub session: NarrativeSnapshot,
    pub liveness: LivenessCounts,
    pub nodes_registered: usize,
    pub pending_pushes: usize,
    pub events_recorded: u64,
}

#[derive(Default)]
struct ProfileState {
    current: Option<AccessibilityProfile>,
    baselines: ProfileBaselines,
}

pub struct HubController {
    container: Arc<HubContainer>,
    /// Held across the pushes so concurrent applies see settled baselines.
    profile: Mutex<ProfileState>,
}

impl HubController {
    pub fn new(container: Arc<HubContainer>) -> Self {
        Self {
            container,
            profile: Mutex::new(ProfileState::default()),
        }
    }

    pub fn get_overview(&self) -> HubOverview {
        let c = &self.container;
        HubOverview {
            session: c.narrative.snapshot(),
            liveness: c.registry.liveness_counts(),
            nodes_registered: c.registry.len(),
            pending_pushes: c.dispatcher.pending_count(),
            events_recorded: c.event_log.total_recorded(),
        }
    }

    pub fn get_node_states(&self) -> Vec<NodeStatus> {
        self.container.registry.snapshot()
    }

    /// Validate a raw payload and push it to every listed node.
    pub async fn push_config(
        &self,
        node_ids: &[NodeId],
        payload: Value,
    ) -> ControllerResult<Vec<PushOutcome>> {
        let payload = NodeConfigPayload::from_json(payload)?;
        Ok(self.container.dispatcher.push(node_ids, &payload).await)
    }

    /// Push, then wait until each node acked or timed out.
    pub async fn push_and_wait(
        &self,
        node_ids: &[NodeId],
        payload: Value,
    ) -> ControllerResult<Vec<(NodeId, Result<PushStatus, DispatchError>)>> {
        let payload = NodeConfigPayload::from_json(payload)?;
        Ok(self.container.dispatcher.push_and_wait(node_ids, &payload).await)
    }

    pub fn push_status(&self, limit: usize) -> Vec<PushRecord> {
        self.container.dispatcher.recent(limit)
    }

    /// Store `profile` and push each registered node's effective settings
    /// unless the node already acknowledged them or has them in flight.
    /// Safe to call at any time: nodes that joined since the last apply, or
    /// whose push timed out, get the profile; nodes that have it get nothing.
    pub async fn apply_accessibility_profile(
        &self,
        profile: AccessibilityProfile,
    ) -> ControllerResult<Vec<PushOutcome>> {
        profile.validate()?;
        let mut state = self.profile.lock().await;
        let dispatcher = &self.container.dispatcher;

        let nodes: Vec<NodeId> = self
            .container
            .registry
            .snapshot()
            .into_iter()
            .map(|status| status.node_id)
            .collect();
        state.baselines.retain(&nodes);
        state
            .baselines
            .settle(|correlation_id| dispatcher.status(correlation_id).map(|r| r.status));

        let targets: Vec<_> = nodes
            .into_iter()
            .filter_map(|node_id| {
                let effective = profile.effective_for(&node_id);
                state
                    .baselines
                    .needs_push(&node_id, &effective)
                    .then_some((node_id, effective))
            })
            .collect();

        let pushes = targets.iter().map(|(node_id, effective)| {
            let payload = NodeConfigPayload::accessibility(effective.clone());
            async move {
                let mut outcome = dispatcher.push(std::slice::from_ref(node_id), &payload).await;
                outcome.pop().unwrap_or_else(|| {
                    (node_id.clone(), Err(DispatchError::ShuttingDown))
                })
            }
        });
        let outcomes = join_all(pushes).await;

        let mut failed = 0usize;
        for ((node_id, effective), (_, result)) in targets.into_iter().zip(&outcomes) {
            match result {
                Ok(ticket) => state
                    .baselines
                    .record_push(node_id, ticket.correlation_id, effective),
                Err(_) => failed += 1,
            }
        }
        if failed == 0 {
            info!(pushed = outcomes.len(), "[hub] Accessibility profile applied");
        } else {
            warn!(
                pushed = outcomes.len() - failed,
                failed, "[hub] Accessibility profile partially applied, failed nodes retry on next apply"
            );
        }
        state.current = Some(profile);
        Ok(outcomes)
    }

    /// Profile stored by the last apply.
    pub async fn accessibility_profile(&self) -> Option<AccessibilityProfile> {
        self.profile.lock().await.current.clone()
    }

    pub async fn reset_narrative(&self) -> ControllerResult<()> {
        self.container.narrative.reset().await?;
        Ok(())
    }

    /// Activate a session; `threshold` falls back to the configured
    /// required fragment count.
    pub async fn activate_session(
        &self,
        session_id: SessionId,
        threshold: Option<usize>,
        participants: Option<Vec<NodeId>>,
    ) -> ControllerResult<()> {
        let threshold =
            threshold.unwrap_or(self.container.config.narrative.required_fragments);
        self.container
            .narrative
            .activate(session_id, threshold, participants)
            .await?;
        Ok(())
    }

    pub fn query_events(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<EventRecord> {
        self.container.event_log.query(since, limit)
    }

    pub fn summarize(&self, since: Option<DateTime<Utc>>) -> EventSummary {
        self.container.event_log.summarize(since)
    }

    pub fn register_node(&self, node_id: NodeId, role: NodeRole) -> ControllerResult<Registration> {
        Ok(self.container.registry.register(node_id, role)?)
    }

    pub async fn retire_node(&self, node_id: &NodeId) -> ControllerResult<()> {
        self.container.registry.retire(node_id)?;
        self.container.dispatcher.release(node_id).await;
        Ok(())
    }

    pub async fn reset_roster(&self) -> usize {
        let departed: Vec<NodeId> = self
            .container
            .registry
            .snapshot()
            .into_iter()
            .map(|status| status.node_id)
            .collect();
        let removed = self.container.registry.reset_roster();
        let dispatcher = &self.container.dispatcher;
        join_all(departed.iter().map(|node_id| dispatcher.release(node_id))).await;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{HubConfig, RosterNode};
    use et_03_config_dispatch::AccessibilitySettings;
    use serde_json::json;
    use shared_bus::{ConfigAck, InMemoryBus, MessageBus, TopicKind, TopicPattern};
    use shared_types::{EventKind, SystemTimeSource};
    use std::time::Duration;

    fn node(id: &str) -> NodeId {
        NodeId::parse(id).unwrap()
    }

    fn controller(bus: Arc<InMemoryBus>) -> HubController {
        let mut config = HubConfig::default();
        config.event_log.persist = false;
        config.nodes = ["whisper-1", "whisper-2"]
            .into_iter()
            .map(|id| RosterNode { node_id: id.into(), role: NodeRole::Whisper })
            .collect();
        let container =
            HubContainer::new(config, bus, Arc::new(SystemTimeSource)).unwrap();
        HubController::new(Arc::new(container))
    }

    fn captions(on: bool) -> AccessibilitySettings {
        AccessibilitySettings { captions: Some(on), ..Default::default() }
    }

    #[tokio::test]
    async fn test_push_config_rejects_invalid_payload() {
        let ctl = controller(Arc::new(InMemoryBus::new()));
        let err = ctl
            .push_config(&[node("whisper-1")], json!({"audio": {"volume": 3.0}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        assert_eq!(ctl.get_overview().pending_pushes, 0);

        let outcomes = ctl
            .push_config(&[node("whisper-1")], json!({"audio": {"volume": 0.5}}))
            .await
            .unwrap();
        assert!(outcomes[0].1.is_ok());
        assert_eq!(ctl.get_overview().pending_pushes, 1);
    }

    #[tokio::test]
    async fn test_profile_apply_is_idempotent() {
        let bus = Arc::new(InMemoryBus::new());
        let mut configs = bus.subscribe(TopicKind::Config.wildcard());
        let ctl = controller(bus);

        let mut profile = AccessibilityProfile { global: captions(true), ..Default::default() };
        assert_eq!(ctl.apply_accessibility_profile(profile.clone()).await.unwrap().len(), 2);
        assert_eq!(configs.drain().len(), 2);

        assert!(ctl.apply_accessibility_profile(profile.clone()).await.unwrap().is_empty());
        assert!(configs.drain().is_empty());

        profile.set_override(node("whisper-2"), &captions(false));
        let outcomes = ctl.apply_accessibility_profile(profile).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, node("whisper-2"));
        let sent = configs.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "ECHOTRACE/config/whisper-2");
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_baseline() {
        let bus = Arc::new(InMemoryBus::new());
        let ctl = controller(bus.clone());
        let profile = AccessibilityProfile { global: captions(true), ..Default::default() };

        bus.set_offline(true);
        let outcomes = ctl.apply_accessibility_profile(profile.clone()).await.unwrap();
        assert!(outcomes.iter().all(|(_, r)| matches!(r, Err(DispatchError::Transport(_)))));

        bus.set_offline(false);
        assert_eq!(ctl.apply_accessibility_profile(profile).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_profile_reaches_node_registered_later() {
        let bus = Arc::new(InMemoryBus::new());
        let mut configs = bus.subscribe(TopicKind::Config.wildcard());
        let ctl = controller(bus);
        let profile = AccessibilityProfile { global: captions(true), ..Default::default() };

        assert_eq!(ctl.apply_accessibility_profile(profile.clone()).await.unwrap().len(), 2);
        configs.drain();

        ctl.register_node(node("whisper-3"), NodeRole::Whisper).unwrap();
        let outcomes = ctl.apply_accessibility_profile(profile.clone()).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, node("whisper-3"));
        let sent = configs.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "ECHOTRACE/config/whisper-3");
        assert_eq!(ctl.accessibility_profile().await, Some(profile));
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_resent_after_timeout_but_not_after_ack() {
        let bus = Arc::new(InMemoryBus::new());
        let ctl = controller(bus);
        let dispatcher = ctl.container.dispatcher.clone();
        let profile = AccessibilityProfile { global: captions(true), ..Default::default() };

        let first = ctl.apply_accessibility_profile(profile.clone()).await.unwrap();
        assert_eq!(first.len(), 2);
        let acked = first
            .iter()
            .find(|(id, _)| *id == node("whisper-1"))
            .and_then(|(_, r)| r.as_ref().ok())
            .unwrap();
        let ack = ConfigAck {
            node_id: acked.node_id.clone(),
            correlation_id: acked.correlation_id,
            status: Some("ok".into()),
            applied: vec!["accessibility".into()],
        };
        dispatcher.on_ack(&ack).await;

        // whisper-2 never answers.
        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = ctl.apply_accessibility_profile(profile).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, node("whisper-2"));
        assert!(second[0].1.is_ok());
    }

    #[tokio::test]
    async fn test_retired_node_releases_dispatch_slot() {
        let ctl = controller(Arc::new(InMemoryBus::new()));
        ctl.push_config(&[node("whisper-1"), node("whisper-2")], json!({"audio": {"volume": 0.5}}))
            .await
            .unwrap();
        assert_eq!(ctl.container.dispatcher.tracked_nodes(), 2);

        ctl.retire_node(&node("whisper-1")).await.unwrap();
        assert_eq!(ctl.container.dispatcher.tracked_nodes(), 1);
        assert_eq!(ctl.get_overview().pending_pushes, 1);

        ctl.reset_roster().await;
        assert_eq!(ctl.container.dispatcher.tracked_nodes(), 0);
        assert_eq!(ctl.get_overview().pending_pushes, 0);
    }

    #[tokio::test]
    async fn test_invalid_profile_rejected() {
        let ctl = controller(Arc::new(InMemoryBus::new()));
        let profile = AccessibilityProfile {
            global: AccessibilitySettings { pace: Some(2.0), ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(
            ctl.apply_accessibility_profile(profile).await,
            Err(ControllerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_actions_are_logged() {
        let bus = Arc::new(InMemoryBus::new());
        let mut state = bus.subscribe(TopicPattern::exact("ECHOTRACE/state/hub"));
        let ctl = controller(bus);
        ctl.activate_session("pack-1".parse().unwrap(), None, None).await.unwrap();
        assert_eq!(ctl.get_overview().session.threshold, 4);

        ctl.reset_narrative().await.unwrap();
        ctl.retire_node(&node("whisper-2")).await.unwrap();
        assert_eq!(ctl.reset_roster().await, 1);
        assert!(ctl.get_node_states().is_empty());

        let admin: Vec<_> = ctl
            .query_events(None, 100)
            .into_iter()
            .filter(|r| r.kind == EventKind::AdminAction)
            .collect();
        assert!(admin.iter().any(|r| r.detail["action"] == "narrative_reset"));
        assert!(admin.len() >= 3);
        assert!(!state.drain().is_empty());
    }
}
