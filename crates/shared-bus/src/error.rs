//! Bus error types.

use thiserror::Error;

/// Publish or subscribe failure at the transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker not reachable.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// Broker refused the message.
    #[error("Publish rejected on {topic}: {reason}")]
    Rejected { topic: String, reason: String },

    /// Subscription pattern cannot be parsed.
    #[error("Invalid topic pattern: {0:?}")]
    InvalidPattern(String),
}

/// An inbound message could not be decoded. Such messages are dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unrecognized topic: {0}")]
    UnknownTopic(String),

    #[error("Invalid node id in topic {topic}: {reason}")]
    InvalidTopicNode { topic: String, reason: String },

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Payload node_id {payload:?} does not match topic node {topic}")]
    NodeMismatch { topic: String, payload: String },

    #[error("Invalid timestamp: {0}")]
    Timestamp(String),
}
