//! # Publisher
//!
//! The publishing side of the bus and the in-memory broker used by the
//! runtime when no external broker is attached, and by every test.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::subscriber::Subscription;
use crate::topics::TopicPattern;
use crate::{TransportError, DEFAULT_CHANNEL_CAPACITY};

/// One message on the bus. Payloads are UTF-8 JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
    /// Broker keeps the last retained message per topic for late subscribers.
    pub retain: bool,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    #[must_use]
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }
}

/// Publish/subscribe transport the hub talks to.
///
/// Delivery is at-least-once with no cross-topic ordering guarantee;
/// consumers must tolerate duplicates.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Hand a message to the transport.
    async fn publish(&self, message: BusMessage) -> Result<(), TransportError>;

    /// Subscribe to topics matching `pattern`.
    fn subscribe(&self, pattern: TopicPattern) -> Subscription;
}

#[async_trait]
impl<B: MessageBus + ?Sized> MessageBus for Arc<B> {
    async fn publish(&self, message: BusMessage) -> Result<(), TransportError> {
        (**self).publish(message).await
    }

    fn subscribe(&self, pattern: TopicPattern) -> Subscription {
        (**self).subscribe(pattern)
    }
}

/// In-process broker over `tokio::sync::broadcast`.
pub struct InMemoryBus {
    sender: broadcast::Sender<BusMessage>,
    retained: RwLock<HashMap<String, BusMessage>>,
    /// Simulated broker outage; publishes fail while set.
    offline: AtomicBool,
    published: AtomicU64,
    capacity: usize,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            retained: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
            published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Toggle the simulated outage.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        debug!(offline, "In-memory bus availability changed");
    }

    /// Last retained message on `topic`, if any.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<BusMessage> {
        self.retained.read().get(topic).cloned()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total messages accepted for delivery.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, message: BusMessage) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            warn!(topic = %message.topic, "Publish refused, bus offline");
            return Err(TransportError::Unavailable(
                "in-memory bus is offline".to_string(),
            ));
        }

        if message.retain {
            let mut retained = self.retained.write();
            if message.payload.is_empty() {
                retained.remove(&message.topic);
            } else {
                retained.insert(message.topic.clone(), message.clone());
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        let topic = message.topic.clone();
        match self.sender.send(message) {
            Ok(receivers) => trace!(%topic, receivers, "Message published"),
            // No receivers is not a transport failure.
            Err(_) => trace!(%topic, "Message published with no subscribers"),
        }
        Ok(())
    }

    fn subscribe(&self, pattern: TopicPattern) -> Subscription {
        // Take the receiver first so nothing published in between is lost.
        let receiver = self.sender.subscribe();
        let mut retained: Vec<BusMessage> = self
            .retained
            .read()
            .values()
            .filter(|m| pattern.matches(&m.topic))
            .cloned()
            .collect();
        retained.sort_by(|a, b| a.topic.cmp(&b.topic));
        debug!(?pattern, retained = retained.len(), "New subscription created");
        Subscription::new(receiver, pattern, retained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryBus::new();
        bus.publish(BusMessage::new("ECHOTRACE/config/whisper-1", "{}"))
            .await
            .unwrap();
        assert_eq!(bus.messages_published(), 1);
    }

    #[tokio::test]
    async fn test_offline_bus_rejects_publish() {
        let bus = InMemoryBus::new();
        bus.set_offline(true);
        let err = bus
            .publish(BusMessage::new("ECHOTRACE/config/whisper-1", "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
        assert_eq!(bus.messages_published(), 0);

        bus.set_offline(false);
        assert!(bus
            .publish(BusMessage::new("ECHOTRACE/config/whisper-1", "{}"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_retained_delivered_to_late_subscriber() {
        let bus = InMemoryBus::new();
        bus.publish(BusMessage::new("ECHOTRACE/state/hub", "{\"v\":1}").retained())
            .await
            .unwrap();
        bus.publish(BusMessage::new("ECHOTRACE/state/hub", "{\"v\":2}").retained())
            .await
            .unwrap();

        let mut sub = bus.subscribe(TopicPattern::exact("ECHOTRACE/state/hub"));
        let first = sub.try_recv().unwrap().unwrap();
        assert_eq!(first.payload, "{\"v\":2}");
        assert!(matches!(sub.try_recv(), Ok(None)));
        assert_eq!(bus.retained("ECHOTRACE/state/hub").unwrap().payload, "{\"v\":2}");
    }

    #[tokio::test]
    async fn test_empty_retained_payload_clears() {
        let bus = InMemoryBus::new();
        bus.publish(BusMessage::new("ECHOTRACE/state/hub", "{}").retained())
            .await
            .unwrap();
        bus.publish(BusMessage::new("ECHOTRACE/state/hub", "").retained())
            .await
            .unwrap();
        assert!(bus.retained("ECHOTRACE/state/hub").is_none());
    }

    #[test]
    fn test_default_bus() {
        let bus = InMemoryBus::default();
        assert_eq!(bus.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.messages_published(), 0);
    }
}
