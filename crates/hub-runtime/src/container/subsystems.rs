//! # Subsystem Container
//!
//! Holds every subsystem instance and wires them together.
//!
//! ## Initialization Order
//!
//! ```text
//! Level 0: Event Log Sink (no dependencies)
//! Level 1: Node Registry (event log)
//! Level 2: Narrative, Config Dispatcher (registry via RegistryDirectory, bus, event log)
//! ```
//!
//! ## Thread Safety
//!
//! Services are shared through `Arc` and synchronize internally; the
//! container itself is immutable after construction.

use std::sync::Arc;

use anyhow::{Context, Result};
use et_01_node_registry::{NodeRegistryApi, NodeRegistryService};
use et_02_narrative::NarrativeService;
use et_03_config_dispatch::ConfigDispatcher;
use et_04_event_log::{CsvFileStore, EventLogSink, InMemoryStore};
use shared_bus::MessageBus;
use shared_types::{EventSink, TimeSource};
use tracing::{info, instrument};

use crate::adapters::RegistryDirectory;
use crate::container::config::HubConfig;

pub struct HubContainer {
    pub config: HubConfig,
    pub bus: Arc<dyn MessageBus>,
    pub clock: Arc<dyn TimeSource>,
    pub event_log: Arc<EventLogSink>,
    pub registry: Arc<NodeRegistryService>,
    pub narrative: Arc<NarrativeService>,
    pub dispatcher: ConfigDispatcher,
}

impl HubContainer {
    /// Build every subsystem and register the static roster. Must be called
    /// inside a Tokio runtime.
    #[instrument(name = "hub_init", skip_all)]
    pub fn new(
        config: HubConfig,
        bus: Arc<dyn MessageBus>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate().context("Invalid hub configuration")?;

        let event_log = Arc::new(if config.event_log.persist {
            info!(dir = %config.event_log.logs_dir.display(), "[hub] Event log persisted to CSV");
            EventLogSink::start(
                config.event_log_config(),
                CsvFileStore::new(&config.event_log.logs_dir),
            )
        } else {
            info!("[hub] Event log kept in memory only");
            EventLogSink::start(config.event_log_config(), InMemoryStore::new())
        });
        let events: Arc<dyn EventSink> = event_log.clone();

        let registry = Arc::new(NodeRegistryService::new(
            config.liveness_config(),
            Arc::clone(&clock),
            Arc::clone(&events),
        ));
        for (node_id, role) in config.roster()? {
            registry
                .register(node_id.clone(), role)
                .with_context(|| format!("Failed to register {node_id}"))?;
        }
        info!(nodes = registry.len(), "[hub] Roster registered");

        let directory = Arc::new(RegistryDirectory::new(Arc::clone(&registry)));
        let narrative = Arc::new(NarrativeService::new(
            config.narrative_config(),
            directory.clone(),
            Arc::clone(&bus),
            Arc::clone(&clock),
            Arc::clone(&events),
        ));
        let dispatcher = ConfigDispatcher::new(
            config.dispatch_config(),
            directory,
            Arc::clone(&bus),
            Arc::clone(&clock),
            events,
        );

        Ok(Self {
            config,
            bus,
            clock,
            event_log,
            registry,
            narrative,
            dispatcher,
        })
    }
}
