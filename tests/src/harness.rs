//! Test fixture: a full hub on a fault-injecting in-memory bus with a
//! manual wall clock. Timers run on Tokio time, so tests that care about
//! timeouts use `#[tokio::test(start_paused = true)]`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hub_runtime::{HubConfig, HubController, HubRuntime, RosterNode};
use serde_json::{json, Value};
use shared_bus::{
    BusMessage, FaultPlan, InMemoryBus, LossyBus, MessageBus, OutboundCommand, Subscription,
    TopicKind, TopicPattern,
};
use shared_types::{EventKind, EventRecord, ManualTimeSource, NodeId, NodeRole};
use tokio::task::JoinHandle;
use tracing::debug;

pub const SESSION: &str = "pack-1";
pub const MYSTERY: &str = "mystery";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn node(id: &str) -> NodeId {
    NodeId::parse(id).unwrap_or_else(|e| panic!("bad node id {id}: {e}"))
}

/// `whisper-1` .. `whisper-<count>`.
pub fn whispers(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("whisper-{i}")).collect()
}

/// In-memory config: session active with `threshold`, `whisper_count`
/// whisper nodes plus one mystery node, 10s heartbeat with factor 5.
pub fn config(threshold: usize, whisper_count: usize) -> HubConfig {
    let mut config = HubConfig::default();
    config.event_log.persist = false;
    config.narrative.session_id = Some(SESSION.to_string());
    config.narrative.required_fragments = threshold;
    config.liveness.heartbeat_interval_secs = 10;
    config.liveness.offline_factor = 5;
    config.dispatch.ack_timeout_ms = 5_000;
    config.nodes = whispers(whisper_count)
        .into_iter()
        .map(|node_id| RosterNode { node_id, role: NodeRole::Whisper })
        .chain(std::iter::once(RosterNode {
            node_id: MYSTERY.to_string(),
            role: NodeRole::Mystery,
        }))
        .collect();
    config
}

pub struct TestHub {
    pub runtime: HubRuntime,
    pub bus: Arc<LossyBus<InMemoryBus>>,
    pub clock: Arc<ManualTimeSource>,
}

impl TestHub {
    pub async fn start(config: HubConfig) -> Self {
        let bus = Arc::new(LossyBus::new(InMemoryBus::new(), FaultPlan::default()));
        let clock = Arc::new(ManualTimeSource::new(start_time()));
        let runtime = HubRuntime::start(config, bus.clone(), clock.clone())
            .await
            .unwrap_or_else(|e| panic!("hub failed to start: {e:#}"));
        Self { runtime, bus, clock }
    }

    pub fn controller(&self) -> &HubController {
        self.runtime.controller()
    }

    /// Publish as node `node_id` on its `kind` topic.
    pub async fn send(&self, kind: TopicKind, node_id: &str, body: Value) {
        let message = BusMessage::new(kind.topic_for(&node(node_id)), body.to_string());
        self.bus
            .publish(message)
            .await
            .unwrap_or_else(|e| panic!("publish failed: {e}"));
    }

    pub async fn trigger(&self, node_id: &str) {
        self.send(TopicKind::Trigger, node_id, json!({})).await;
    }

    pub async fn heartbeat(&self, node_id: &str) {
        self.send(TopicKind::Health, node_id, json!({})).await;
    }

    /// Subscribe on the undisturbed inner bus.
    pub fn observe(&self, pattern: TopicPattern) -> Subscription {
        self.bus.inner().subscribe(pattern)
    }

    pub fn events(&self, kind: EventKind) -> Vec<EventRecord> {
        self.controller()
            .query_events(None, usize::MAX)
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events(kind).len()
    }

    /// Wait until the router has handled `total` messages.
    pub async fn routed(&self, total: u64) {
        let stats = self.runtime.router_stats();
        eventually(|| stats.routed() >= total).await;
    }
}

/// Poll `check` on Tokio time for up to a second.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached within 1s");
}

/// A node that acknowledges every config push addressed to it.
pub fn spawn_acking_node(bus: Arc<LossyBus<InMemoryBus>>, node_id: &str) -> JoinHandle<()> {
    let id = node(node_id);
    let mut pushes = bus.subscribe(TopicPattern::exact(&TopicKind::Config.topic_for(&id)));
    tokio::spawn(async move {
        while let Some(message) = pushes.recv().await {
            let Ok(OutboundCommand::ConfigPush { correlation_id, payload, .. }) =
                OutboundCommand::decode(&message)
            else {
                continue;
            };
            let applied: Vec<String> = payload
                .as_object()
                .map(|sections| sections.keys().cloned().collect())
                .unwrap_or_default();
            let ack = json!({
                "correlation_id": correlation_id,
                "status": "ok",
                "applied": applied,
            });
            debug!(node = %id, %correlation_id, "simulated node acking");
            let reply = BusMessage::new(TopicKind::Ack.topic_for(&id), ack.to_string());
            if bus.publish(reply).await.is_err() {
                break;
            }
        }
    })
}
