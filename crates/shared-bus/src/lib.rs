//! # Shared Bus - Publish/Subscribe Transport Abstraction
//!
//! Everything the hub says to or hears from a node crosses a topic-addressed
//! bus with at-least-once delivery, no ordering across topics, possible
//! duplicates, arbitrary delay, and drops after a partition.
//!
//! ```text
//! ┌────────────┐  ECHOTRACE/{health,trigger,ack}/<node>  ┌───────────┐
//! │   Nodes    │ ──────────────────────────────────────▶ │           │
//! │            │                                         │    Hub    │
//! │            │ ◀────────────────────────────────────── │           │
//! └────────────┘  ECHOTRACE/{config,unlock}/<node>       └───────────┘
//!                 ECHOTRACE/state/hub (retained)
//! ```
//!
//! The core depends only on [`MessageBus`]. With the `mqtt` feature,
//! `MqttBus` talks to a real broker; [`InMemoryBus`] stands in for it in
//! tests and local runs, and [`LossyBus`] adds the failure modes tests need.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod error;
pub mod fault;
pub mod messages;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod publisher;
pub mod subscriber;
pub mod topics;

pub use error::{CodecError, TransportError};
pub use fault::{FaultPlan, LossyBus};
pub use messages::{
    ConfigAck, FragmentTrigger, Heartbeat, HubStatePayload, InboundMessage, OutboundCommand,
};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBus, MqttSettings};
pub use publisher::{BusMessage, InMemoryBus, MessageBus};
pub use subscriber::{Subscription, SubscriptionError};
pub use topics::{hub_state_topic, TopicKind, TopicPattern, PREFIX};

/// Messages buffered per subscriber before the slowest one lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
