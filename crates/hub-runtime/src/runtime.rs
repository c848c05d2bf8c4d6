//! # Hub Runtime
//!
//! Owns the container, the inbound router task and the shutdown channel.
//!
//! ## Startup Sequence
//!
//! 1. Build the container (event log, registry, narrative, dispatcher)
//! 2. Activate the configured startup session, if any
//! 3. Subscribe the inbound router and spawn it
//!
//! ## Shutdown Sequence
//!
//! 1. Signal the router; no new inbound routing
//! 2. Wait for in-flight routing (bounded)
//! 3. Cancel outstanding push timers
//! 4. Flush and close the event log (bounded)

use std::sync::Arc;

use anyhow::{Context, Result};
use et_02_narrative::NarrativeApi;
use et_03_config_dispatch::ConfigDispatchApi;
use parking_lot::Mutex;
use shared_bus::MessageBus;
use shared_types::TimeSource;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::container::{HubConfig, HubContainer};
use crate::controller::HubController;
use crate::handlers::{InboundRouter, RouterStats};

pub struct HubRuntime {
    container: Arc<HubContainer>,
    controller: HubController,
    router: Mutex<Option<JoinHandle<()>>>,
    router_stats: Arc<RouterStats>,
    shutdown_tx: watch::Sender<bool>,
    /// Keeps `send` from failing once the router has exited.
    _shutdown_rx: watch::Receiver<bool>,
}

impl HubRuntime {
    /// Build everything and start routing. Messages published after this
    /// returns are routed.
    pub async fn start(
        config: HubConfig,
        bus: Arc<dyn MessageBus>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        info!("===========================================");
        info!("  EchoTrace Hub Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let startup_session = config.session_id()?;
        let participants = config.participants()?;
        let threshold = config.narrative.required_fragments;

        let container = Arc::new(HubContainer::new(config, bus, clock)?);
        if let Some(session_id) = startup_session {
            container
                .narrative
                .activate(session_id.clone(), threshold, participants)
                .await
                .with_context(|| format!("Failed to activate session {session_id}"))?;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = InboundRouter::new(&container);
        let router_stats = router.stats();
        let handle = tokio::spawn(router.run(shutdown_rx.clone()));

        info!(
            nodes = container.config.nodes.len(),
            broker = %format!("{}:{}", container.config.broker.host, container.config.broker.port),
            "[hub] Runtime started"
        );

        Ok(Self {
            controller: HubController::new(Arc::clone(&container)),
            container,
            router: Mutex::new(Some(handle)),
            router_stats,
            shutdown_tx,
            _shutdown_rx: shutdown_rx,
        })
    }

    pub fn controller(&self) -> &HubController {
        &self.controller
    }

    pub fn container(&self) -> Arc<HubContainer> {
        Arc::clone(&self.container)
    }

    pub fn router_stats(&self) -> &RouterStats {
        &self.router_stats
    }

    /// Stop the runtime. Safe to call more than once; every wait is bounded
    /// by the configured shutdown grace.
    pub async fn shutdown(&self) {
        let grace = self.container.config.shutdown_grace();
        info!(grace_ms = grace.as_millis() as u64, "[hub] Initiating graceful shutdown");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!(error = %e, "[hub] Failed to send shutdown signal");
        }

        let router = self.router.lock().take();
        if let Some(mut handle) = router {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "[hub] Inbound router task failed"),
                Err(_) => {
                    warn!("[hub] Inbound router did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        if tokio::time::timeout(grace, self.container.dispatcher.shutdown())
            .await
            .is_err()
        {
            warn!("[hub] Config dispatcher shutdown timed out");
        }

        let event_log = &self.container.event_log;
        if !event_log.is_closed() {
            if let Err(e) = event_log.flush().await {
                warn!(error = %e, "[hub] Event log flush failed");
            }
            if let Err(e) = event_log.close().await {
                warn!(error = %e, "[hub] Event log close failed");
            }
        }

        info!(
            routed = self.router_stats.routed(),
            malformed = self.router_stats.malformed(),
            "[hub] Shutdown complete"
        );
    }
}
