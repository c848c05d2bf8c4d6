//! # Subscriber
//!
//! Receiving side of the bus. A subscription first drains the retained
//! messages that matched its pattern at subscribe time, then live traffic.

use std::collections::VecDeque;

use futures::stream::{self, Stream};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::publisher::BusMessage;
use crate::topics::TopicPattern;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped.
    #[error("Message bus closed")]
    Closed,
}

/// A subscription handle for receiving messages.
pub struct Subscription {
    receiver: broadcast::Receiver<BusMessage>,
    pattern: TopicPattern,
    retained: VecDeque<BusMessage>,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<BusMessage>,
        pattern: TopicPattern,
        retained: Vec<BusMessage>,
    ) -> Self {
        Self {
            receiver,
            pattern,
            retained: retained.into(),
        }
    }

    /// Receive the next message whose topic matches.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        if let Some(msg) = self.retained.pop_front() {
            return Some(msg);
        }
        loop {
            let msg = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some messages dropped");
                    continue;
                }
            };
            if self.pattern.matches(&msg.topic) {
                return Some(msg);
            }
        }
    }

    /// Receive without waiting.
    ///
    /// - `Ok(Some(msg))` a matching message was ready
    /// - `Ok(None)` nothing ready
    /// - `Err(SubscriptionError::Closed)` the bus was dropped
    pub fn try_recv(&mut self) -> Result<Option<BusMessage>, SubscriptionError> {
        if let Some(msg) = self.retained.pop_front() {
            return Ok(Some(msg));
        }
        loop {
            let msg = match self.receiver.try_recv() {
                Ok(m) => m,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };
            if self.pattern.matches(&msg.topic) {
                return Ok(Some(msg));
            }
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<BusMessage> {
        let mut out = Vec::new();
        while let Ok(Some(msg)) = self.try_recv() {
            out.push(msg);
        }
        out
    }

    #[must_use]
    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// Turn the subscription into a stream of matching messages.
    pub fn into_stream(self) -> impl Stream<Item = BusMessage> + Send + Unpin {
        Box::pin(stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|msg| (msg, sub))
        }))
    }
}
