//! # Inbound Router
//!
//! Subscribes to the node → hub topic families and routes every message to
//! the subsystem that owns its entity.
//!
//! ## Flow
//!
//! 1. `ECHOTRACE/health/<node>`  → Node Registry `record_heartbeat`
//! 2. `ECHOTRACE/trigger/<node>` → Narrative `on_fragment_triggered`
//! 3. `ECHOTRACE/ack/<node>`     → Config Dispatcher `on_ack`
//!
//! Each delivery is routed on its own task. Deliveries for the same entity
//! serialize on that entity's lock inside the subsystem, so nothing here
//! needs a global lock. Malformed messages are dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use et_01_node_registry::{HeartbeatOutcome, NodeRegistryApi, NodeRegistryService};
use et_02_narrative::{NarrativeApi, NarrativeError, NarrativeService, TriggerOutcome};
use et_03_config_dispatch::{AckOutcome, ConfigDispatchApi, ConfigDispatcher};
use futures::stream::{self, StreamExt};
use shared_bus::{BusMessage, CodecError, InboundMessage, MessageBus, TopicKind};
use shared_types::TimeSource;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::container::HubContainer;

/// What routing one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Heartbeat(HeartbeatOutcome),
    Trigger(Result<TriggerOutcome, NarrativeError>),
    Ack(AckOutcome),
    Malformed(CodecError),
}

/// Counters shared between the router and whoever reports on it.
#[derive(Debug, Default)]
pub struct RouterStats {
    routed: AtomicU64,
    malformed: AtomicU64,
    rejected: AtomicU64,
}

impl RouterStats {
    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Well-formed messages the owning subsystem refused.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &RouteOutcome) {
        self.routed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            RouteOutcome::Malformed(_) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
            }
            RouteOutcome::Heartbeat(HeartbeatOutcome::UnknownNode)
            | RouteOutcome::Trigger(Err(NarrativeError::Validation(_))) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Subsystem handles a routing task needs.
#[derive(Clone)]
struct Targets {
    registry: Arc<NodeRegistryService>,
    narrative: Arc<NarrativeService>,
    dispatcher: ConfigDispatcher,
    clock: Arc<dyn TimeSource>,
    stats: Arc<RouterStats>,
}

impl Targets {
    async fn route(&self, message: &BusMessage) -> RouteOutcome {
        let outcome = match InboundMessage::decode(message) {
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "[hub] Dropping malformed message");
                RouteOutcome::Malformed(e)
            }
            Ok(InboundMessage::Heartbeat(heartbeat)) => {
                let sent_at = heartbeat.sent_at.unwrap_or_else(|| self.clock.now());
                let outcome = self.registry.record_heartbeat(&heartbeat.node_id, sent_at);
                if outcome == HeartbeatOutcome::UnknownNode {
                    debug!(node = %heartbeat.node_id, role = ?heartbeat.role, "[hub] Heartbeat from unregistered node");
                }
                RouteOutcome::Heartbeat(outcome)
            }
            Ok(InboundMessage::FragmentTriggered(trigger)) => {
                let sent_at = trigger.sent_at.unwrap_or_else(|| self.clock.now());
                let result = self
                    .narrative
                    .on_fragment_triggered(&trigger.node_id, trigger.fragment_id, sent_at)
                    .await;
                match &result {
                    Err(NarrativeError::Validation(e)) => {
                        debug!(node = %trigger.node_id, reason = %e, "[hub] Trigger rejected");
                    }
                    Err(e) => warn!(node = %trigger.node_id, error = %e, "[hub] Trigger handling failed"),
                    Ok(_) => {}
                }
                RouteOutcome::Trigger(result)
            }
            Ok(InboundMessage::ConfigAck(ack)) => RouteOutcome::Ack(self.dispatcher.on_ack(&ack).await),
        };
        self.stats.record(&outcome);
        outcome
    }
}

/// Routes node traffic from the bus into the subsystems.
pub struct InboundRouter {
    targets: Targets,
    inbound: Box<dyn futures::Stream<Item = BusMessage> + Send + Unpin>,
}

impl InboundRouter {
    /// Subscribe to the inbound topic families. Subscriptions are live as
    /// soon as this returns, before `run` is polled.
    pub fn new(container: &HubContainer) -> Self {
        let subscriptions = [TopicKind::Health, TopicKind::Trigger, TopicKind::Ack]
            .into_iter()
            .map(|kind| container.bus.subscribe(kind.wildcard()).into_stream());
        Self {
            targets: Targets {
                registry: Arc::clone(&container.registry),
                narrative: Arc::clone(&container.narrative),
                dispatcher: container.dispatcher.clone(),
                clock: Arc::clone(&container.clock),
                stats: Arc::new(RouterStats::default()),
            },
            inbound: Box::new(stream::select_all(subscriptions)),
        }
    }

    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.targets.stats)
    }

    /// Route a single message inline.
    pub async fn route(&self, message: &BusMessage) -> RouteOutcome {
        self.targets.route(message).await
    }

    /// Run until the shutdown signal flips or the bus closes. In-flight
    /// routing tasks are awaited before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("[hub] Inbound router started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[hub] Inbound router stopping");
                        break;
                    }
                }
                next = self.inbound.next() => {
                    let Some(message) = next else {
                        info!("[hub] Bus closed, inbound router exiting");
                        break;
                    };
                    let targets = self.targets.clone();
                    in_flight.spawn(async move {
                        targets.route(&message).await;
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "[hub] Routing task failed");
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "[hub] Routing task failed");
            }
        }
        info!(
            routed = self.targets.stats.routed(),
            malformed = self.targets.stats.malformed(),
            "[hub] Inbound router stopped"
        );
    }
}
