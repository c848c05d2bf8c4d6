//! Bus selection for the hub process.

use std::sync::Arc;
use std::time::Duration;

use shared_bus::{InMemoryBus, MessageBus, MqttBus};
use tracing::{info, warn};

use crate::container::{BrokerTransport, HubConfig};

/// The bus the hub runs on, kept concrete so it can be closed.
pub enum HubTransport {
    Mqtt(Arc<MqttBus>),
    Memory(Arc<InMemoryBus>),
}

impl HubTransport {
    /// Connect according to `[broker]`. Must be called inside a Tokio
    /// runtime; the MQTT connection completes in the background.
    pub fn open(config: &HubConfig) -> Self {
        match config.broker.transport {
            BrokerTransport::Mqtt => Self::Mqtt(Arc::new(MqttBus::connect(&config.mqtt_settings()))),
            BrokerTransport::Memory => {
                warn!("[hub] Running on the in-memory bus, no node can reach this hub");
                Self::Memory(Arc::new(InMemoryBus::new()))
            }
        }
    }

    #[must_use]
    pub fn bus(&self) -> Arc<dyn MessageBus> {
        match self {
            Self::Mqtt(bus) => bus.clone(),
            Self::Memory(bus) => bus.clone(),
        }
    }

    /// Wait up to `limit` for the broker so the startup state snapshot is
    /// not published into a dead connection. Returns false on timeout; the
    /// connection keeps retrying in the background.
    pub async fn ready(&self, limit: Duration) -> bool {
        match self {
            Self::Mqtt(bus) => {
                let up = bus.wait_connected(limit).await;
                if up {
                    info!("[hub] Broker connection established");
                } else {
                    warn!(waited = ?limit, "[hub] Broker not reachable yet, starting anyway");
                }
                up
            }
            Self::Memory(_) => true,
        }
    }

    /// Disconnect from the broker, if any.
    pub async fn close(&self) {
        if let Self::Mqtt(bus) = self {
            bus.disconnect().await;
        }
    }
}
