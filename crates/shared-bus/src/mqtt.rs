//! # MQTT Transport
//!
//! [`MessageBus`] over an MQTT broker through `rumqttc`. Publishes and
//! subscriptions use QoS 1 (at least once). Incoming publishes fan out to
//! local subscriptions through a broadcast channel, the same way
//! [`InMemoryBus`](crate::InMemoryBus) delivers them; the broker replays
//! retained topics such as `ECHOTRACE/state/hub` on subscribe.
//!
//! The connection task owns the event loop. It reconnects after a retry
//! delay and re-issues every subscription on each `CONNACK`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::publisher::{BusMessage, MessageBus};
use crate::subscriber::Subscription;
use crate::topics::TopicPattern;
use crate::{TransportError, DEFAULT_CHANNEL_CAPACITY};

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Wait between reconnect attempts.
    pub retry_delay: Duration,
    /// Requests queued towards the event loop.
    pub request_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "echotrace-hub".to_string(),
            keep_alive: Duration::from_secs(60),
            retry_delay: Duration::from_secs(2),
            request_capacity: 64,
        }
    }
}

struct Shared {
    sender: broadcast::Sender<BusMessage>,
    filters: Mutex<BTreeSet<String>>,
    connected: watch::Sender<bool>,
}

/// MQTT-backed bus. Must be created inside a Tokio runtime.
pub struct MqttBus {
    client: AsyncClient,
    shared: Arc<Shared>,
    connection: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBus {
    /// Start the connection task. Returns immediately; publishes fail with
    /// `Unavailable` until the broker accepts the connection.
    #[must_use]
    pub fn connect(settings: &MqttSettings) -> Self {
        let mut options =
            MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, settings.request_capacity);
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            sender,
            filters: Mutex::new(BTreeSet::new()),
            connected: watch::channel(false).0,
        });
        let connection = tokio::spawn(drive(
            eventloop,
            client.clone(),
            Arc::clone(&shared),
            settings.retry_delay,
        ));
        info!(host = %settings.host, port = settings.port, client_id = %settings.client_id, "Connecting to MQTT broker");

        Self {
            client,
            shared,
            connection: Mutex::new(Some(connection)),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Wait up to `limit` for the broker to accept the connection.
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let mut connected = self.shared.connected.subscribe();
        tokio::time::timeout(limit, connected.wait_for(|up| *up))
            .await
            .is_ok_and(|changed| changed.is_ok())
    }

    /// Topic filters requested from the broker.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.shared.filters.lock().iter().cloned().collect()
    }

    /// Send `DISCONNECT` and stop the connection task.
    pub async fn disconnect(&self) {
        if self.is_connected() {
            if let Err(e) = self.client.disconnect().await {
                debug!(error = %e, "MQTT disconnect request not delivered");
            }
        }
        self.shared.connected.send_replace(false);
        if let Some(connection) = self.connection.lock().take() {
            connection.abort();
        }
        info!("MQTT transport stopped");
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.abort();
        }
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, message: BusMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Unavailable(
                "MQTT broker not connected".to_string(),
            ));
        }
        let topic = message.topic;
        self.client
            .publish(
                topic.clone(),
                QoS::AtLeastOnce,
                message.retain,
                message.payload.into_bytes(),
            )
            .await
            .map_err(|e| {
                warn!(%topic, error = %e, "MQTT publish failed");
                TransportError::Unavailable(e.to_string())
            })?;
        trace!(%topic, "Message handed to MQTT client");
        Ok(())
    }

    fn subscribe(&self, pattern: TopicPattern) -> Subscription {
        let receiver = self.shared.sender.subscribe();
        let filter = pattern.to_string();
        let added = self.shared.filters.lock().insert(filter.clone());
        if added && self.is_connected() {
            if let Err(e) = self.client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                warn!(%filter, error = %e, "MQTT subscribe deferred to next connect");
            }
        }
        debug!(%filter, "New MQTT subscription created");
        Subscription::new(receiver, pattern, Vec::new())
    }
}

async fn drive(mut eventloop: EventLoop, client: AsyncClient, shared: Arc<Shared>, retry: Duration) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                shared.connected.send_replace(true);
                let filters: Vec<String> = shared.filters.lock().iter().cloned().collect();
                info!(code = ?ack.code, filters = filters.len(), "Connected to MQTT broker");
                // try_ keeps the event loop from waiting on its own request queue.
                for filter in filters {
                    if let Err(e) = client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                        warn!(%filter, error = %e, "MQTT resubscribe failed");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => match into_bus_message(publish) {
                Some(message) => {
                    // No local subscribers is not an error.
                    let _ = shared.sender.send(message);
                }
                None => debug!("Non-UTF-8 MQTT payload dropped"),
            },
            Ok(Event::Incoming(Packet::Disconnect)) => {
                shared.connected.send_replace(false);
                warn!("MQTT broker closed the session");
            }
            Ok(_) => {}
            Err(e) => {
                if shared.connected.send_replace(false) {
                    warn!(error = %e, "MQTT connection lost, reconnecting");
                } else {
                    debug!(error = %e, "MQTT broker unreachable, retrying");
                }
                tokio::time::sleep(retry).await;
            }
        }
    }
}

fn into_bus_message(publish: Publish) -> Option<BusMessage> {
    let payload = String::from_utf8(publish.payload.to_vec()).ok()?;
    Some(BusMessage {
        topic: publish.topic,
        payload,
        retain: publish.retain,
    })
}
