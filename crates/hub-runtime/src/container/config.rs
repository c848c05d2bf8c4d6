//! # Hub Configuration
//!
//! Unified configuration for all subsystems and runtime parameters, read
//! from TOML. Every field has a default, so an empty file is a valid
//! configuration for a hub with no roster.
//!
//! ```toml
//! shutdown_grace_ms = 3000
//!
//! [broker]
//! transport = "mqtt"
//! host = "localhost"
//! port = 1883
//!
//! [narrative]
//! session_id = "harbour-tales"
//! required_fragments = 4
//!
//! [dispatch]
//! ack_timeout_ms = 5000
//!
//! [event_log]
//! logs_dir = "hub/logs"
//!
//! [[nodes]]
//! node_id = "whisper-1"
//! role = "whisper"
//! ```
//!
//! Environment overrides, applied after the file:
//! `ECHOTRACE_BROKER_HOST`, `ECHOTRACE_BROKER_PORT`, `ECHOTRACE_LOGS_DIR`,
//! `ECHOTRACE_REQUIRED_FRAGMENTS`, `ECHOTRACE_ACK_TIMEOUT_MS`.
//! `ECHOTRACE_CONFIG` names the file itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use et_01_node_registry::LivenessConfig;
use et_02_narrative::NarrativeConfig;
use et_03_config_dispatch::DispatchConfig;
use et_04_event_log::EventLogConfig;
use serde::{Deserialize, Serialize};
use shared_bus::MqttSettings;
use shared_types::{NodeId, NodeRole, SessionId};
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "ECHOTRACE_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment override {var}={value:?} is not valid")]
    InvalidOverride { var: &'static str, value: String },

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubConfig {
    pub broker: BrokerConfig,
    pub liveness: LivenessSection,
    pub narrative: NarrativeSection,
    pub dispatch: DispatchSection,
    pub event_log: EventLogSection,
    /// Upper bound on every wait during shutdown.
    pub shutdown_grace_ms: u64,
    /// Static roster registered at startup.
    pub nodes: Vec<RosterNode>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            liveness: LivenessSection::default(),
            narrative: NarrativeSection::default(),
            dispatch: DispatchSection::default(),
            event_log: EventLogSection::default(),
            shutdown_grace_ms: 3000,
            nodes: Vec::new(),
        }
    }
}

/// Which bus the hub process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerTransport {
    /// External MQTT broker at `host:port`.
    Mqtt,
    /// In-process bus; nothing outside the process can reach the hub.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub transport: BrokerTransport,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            transport: BrokerTransport::Mqtt,
            host: "localhost".to_string(),
            port: 1883,
            client_id: "echotrace-hub".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LivenessSection {
    pub heartbeat_interval_secs: u64,
    pub offline_factor: u32,
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 15,
            offline_factor: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NarrativeSection {
    /// Content pack activated at startup, if any.
    pub session_id: Option<String>,
    pub required_fragments: usize,
    /// Whisper nodes that count for the startup session; all if absent.
    pub participants: Option<Vec<String>>,
}

impl Default for NarrativeSection {
    fn default() -> Self {
        Self {
            session_id: None,
            required_fragments: 4,
            participants: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    pub ack_timeout_ms: u64,
    pub wait_grace_ms: u64,
    pub audit_capacity: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            wait_grace_ms: 500,
            audit_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventLogSection {
    /// Write daily CSV files; otherwise keep events in memory only.
    pub persist: bool,
    pub logs_dir: PathBuf,
    pub window_capacity: usize,
    pub flush_timeout_ms: u64,
}

impl Default for EventLogSection {
    fn default() -> Self {
        Self {
            persist: true,
            logs_dir: PathBuf::from("hub/logs"),
            window_capacity: 10_000,
            flush_timeout_ms: 2000,
        }
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RosterNode {
    pub node_id: String,
    pub role: NodeRole,
}

impl HubConfig {
    /// Parse TOML text. Does not apply overrides or validate.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a file. Does not apply overrides or validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Load from `ECHOTRACE_CONFIG` (defaults if unset), apply environment
    /// overrides and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("ECHOTRACE_BROKER_HOST") {
            self.broker.host = host.trim().to_string();
        }
        if let Some(value) = lookup("ECHOTRACE_BROKER_PORT") {
            self.broker.port = value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                var: "ECHOTRACE_BROKER_PORT",
                value: value.clone(),
            })?;
        }
        if let Some(dir) = lookup("ECHOTRACE_LOGS_DIR") {
            self.event_log.logs_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("ECHOTRACE_REQUIRED_FRAGMENTS") {
            self.narrative.required_fragments =
                value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                    var: "ECHOTRACE_REQUIRED_FRAGMENTS",
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("ECHOTRACE_ACK_TIMEOUT_MS") {
            self.dispatch.ack_timeout_ms =
                value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                    var: "ECHOTRACE_ACK_TIMEOUT_MS",
                    value: value.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.transport == BrokerTransport::Mqtt {
            if self.broker.host.is_empty() {
                return Err(ConfigError::invalid("broker.host", "must not be empty"));
            }
            if self.broker.port == 0 {
                return Err(ConfigError::invalid("broker.port", "must be positive"));
            }
            if self.broker.client_id.is_empty() {
                return Err(ConfigError::invalid("broker.client_id", "must not be empty"));
            }
            if self.broker.keep_alive_secs < 5 {
                return Err(ConfigError::invalid("broker.keep_alive_secs", "must be at least 5"));
            }
        }
        if self.liveness.heartbeat_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "liveness.heartbeat_interval_secs",
                "must be at least 1",
            ));
        }
        if self.liveness.offline_factor == 0 {
            return Err(ConfigError::invalid("liveness.offline_factor", "must be at least 1"));
        }
        if self.narrative.required_fragments == 0 {
            return Err(ConfigError::invalid(
                "narrative.required_fragments",
                "must be at least 1",
            ));
        }
        if self.dispatch.ack_timeout_ms == 0 {
            return Err(ConfigError::invalid("dispatch.ack_timeout_ms", "must be positive"));
        }
        if self.event_log.window_capacity == 0 {
            return Err(ConfigError::invalid("event_log.window_capacity", "must be positive"));
        }

        let roster = self.roster()?;
        self.session_id()?;
        for node_id in self.participants()?.unwrap_or_default() {
            let is_whisper = roster
                .iter()
                .any(|(id, role)| *id == node_id && *role == NodeRole::Whisper);
            if !is_whisper {
                return Err(ConfigError::invalid(
                    "narrative.participants",
                    format!("{node_id} is not a whisper node in the roster"),
                ));
            }
        }
        Ok(())
    }

    /// Parsed roster. Rejects malformed and duplicate ids.
    pub fn roster(&self) -> Result<Vec<(NodeId, NodeRole)>, ConfigError> {
        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .map(|entry| {
                let node_id = NodeId::parse(&entry.node_id)
                    .map_err(|e| ConfigError::invalid("nodes.node_id", e.to_string()))?;
                if !seen.insert(node_id.clone()) {
                    return Err(ConfigError::invalid(
                        "nodes.node_id",
                        format!("{node_id} is listed twice"),
                    ));
                }
                Ok((node_id, entry.role))
            })
            .collect()
    }

    /// Startup session, if one is configured.
    pub fn session_id(&self) -> Result<Option<SessionId>, ConfigError> {
        self.narrative
            .session_id
            .as_deref()
            .map(SessionId::parse)
            .transpose()
            .map_err(|e| ConfigError::invalid("narrative.session_id", e.to_string()))
    }

    pub fn participants(&self) -> Result<Option<Vec<NodeId>>, ConfigError> {
        self.narrative
            .participants
            .as_ref()
            .map(|list| {
                list.iter()
                    .map(|raw| {
                        NodeId::parse(raw).map_err(|e| {
                            ConfigError::invalid("narrative.participants", e.to_string())
                        })
                    })
                    .collect()
            })
            .transpose()
    }

    #[must_use]
    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.broker.host.clone(),
            port: self.broker.port,
            client_id: self.broker.client_id.clone(),
            keep_alive: Duration::from_secs(self.broker.keep_alive_secs),
            retry_delay: Duration::from_millis(self.broker.reconnect_delay_ms),
            ..MqttSettings::default()
        }
    }

    #[must_use]
    pub fn liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            interval: Duration::from_secs(self.liveness.heartbeat_interval_secs),
            offline_factor: self.liveness.offline_factor,
        }
    }

    #[must_use]
    pub fn narrative_config(&self) -> NarrativeConfig {
        NarrativeConfig {
            default_threshold: self.narrative.required_fragments,
        }
    }

    #[must_use]
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            ack_timeout: Duration::from_millis(self.dispatch.ack_timeout_ms),
            wait_grace: Duration::from_millis(self.dispatch.wait_grace_ms),
            audit_capacity: self.dispatch.audit_capacity,
        }
    }

    #[must_use]
    pub fn event_log_config(&self) -> EventLogConfig {
        EventLogConfig {
            window_capacity: self.event_log.window_capacity,
            flush_timeout: Duration::from_millis(self.event_log.flush_timeout_ms),
        }
    }

    /// How long startup waits for the broker before going on without it.
    #[must_use]
    pub fn startup_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.keep_alive_secs.min(10))
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
