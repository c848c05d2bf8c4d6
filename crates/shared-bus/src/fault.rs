//! # Fault Injection
//!
//! `LossyBus` wraps another bus and misbehaves the way a real broker can:
//! it duplicates messages, silently drops matching topics (partition) or
//! rejects publishes outright.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::publisher::{BusMessage, MessageBus};
use crate::subscriber::Subscription;
use crate::topics::TopicPattern;
use crate::TransportError;

/// What the wrapper does to each published message.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Extra copies delivered per publish.
    pub duplicates: usize,
    /// Topics that get the extra copies; every topic when unset.
    pub duplicate_on: Option<TopicPattern>,
    /// Topics lost in transit; the publisher still sees success.
    pub drop: Option<TopicPattern>,
    /// Topics the broker refuses.
    pub reject: Option<TopicPattern>,
}

impl FaultPlan {
    #[must_use]
    pub fn duplicating(copies: usize) -> Self {
        Self {
            duplicates: copies,
            ..Self::default()
        }
    }

    /// Duplicate only topics matching `pattern`, e.g. inbound node traffic
    /// while the hub's own commands pass through once.
    #[must_use]
    pub fn duplicating_on(copies: usize, pattern: TopicPattern) -> Self {
        Self {
            duplicates: copies,
            duplicate_on: Some(pattern),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn dropping(pattern: TopicPattern) -> Self {
        Self {
            drop: Some(pattern),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rejecting(pattern: TopicPattern) -> Self {
        Self {
            reject: Some(pattern),
            ..Self::default()
        }
    }
}

pub struct LossyBus<B> {
    inner: B,
    plan: RwLock<FaultPlan>,
    dropped: AtomicU64,
}

impl<B: MessageBus> LossyBus<B> {
    pub fn new(inner: B, plan: FaultPlan) -> Self {
        Self {
            inner,
            plan: RwLock::new(plan),
            dropped: AtomicU64::new(0),
        }
    }

    /// Swap the fault plan, e.g. to heal a partition mid-test.
    pub fn set_plan(&self, plan: FaultPlan) {
        *self.plan.write() = plan;
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: MessageBus> MessageBus for LossyBus<B> {
    async fn publish(&self, message: BusMessage) -> Result<(), TransportError> {
        let plan = self.plan.read().clone();

        if plan.reject.as_ref().is_some_and(|p| p.matches(&message.topic)) {
            return Err(TransportError::Rejected {
                topic: message.topic,
                reason: "fault plan rejects topic".to_string(),
            });
        }
        if plan.drop.as_ref().is_some_and(|p| p.matches(&message.topic)) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(topic = %message.topic, "Fault plan dropped message");
            return Ok(());
        }

        let copies = match &plan.duplicate_on {
            Some(pattern) if !pattern.matches(&message.topic) => 0,
            _ => plan.duplicates,
        };
        for _ in 0..copies {
            self.inner.publish(message.clone()).await?;
        }
        self.inner.publish(message).await
    }

    fn subscribe(&self, pattern: TopicPattern) -> Subscription {
        self.inner.subscribe(pattern)
    }
}
