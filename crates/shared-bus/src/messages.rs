//! # Messages
//!
//! Wire codec between bus payloads and typed hub messages.
//!
//! The node id always comes from the topic. A payload may repeat it, but a
//! disagreeing payload `node_id` makes the message malformed. Timestamps are
//! epoch seconds as floats; a missing `ts` means "time of receipt", which the
//! router fills in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shared_types::{CorrelationId, FragmentId, NodeId, NodeRole, SessionId};

use crate::error::CodecError;
use crate::publisher::BusMessage;
use crate::topics::{hub_state_topic, TopicKind};

/// Periodic liveness signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub node_id: NodeId,
    pub role: Option<NodeRole>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A whisper node played its fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentTrigger {
    pub node_id: NodeId,
    pub fragment_id: FragmentId,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A node applied (or refused) a config push.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigAck {
    pub node_id: NodeId,
    pub correlation_id: CorrelationId,
    pub status: Option<String>,
    pub applied: Vec<String>,
}

/// Anything a node sends to the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Heartbeat(Heartbeat),
    FragmentTriggered(FragmentTrigger),
    ConfigAck(ConfigAck),
}

#[derive(Deserialize)]
struct HeartbeatWire {
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    role: Option<NodeRole>,
    #[serde(default)]
    ts: Option<f64>,
}

#[derive(Deserialize)]
struct TriggerWire {
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    fragment_id: Option<FragmentId>,
    #[serde(default)]
    ts: Option<f64>,
}

#[derive(Deserialize)]
struct AckWire {
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    correlation_id: Option<CorrelationId>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    applied: Vec<String>,
}

impl InboundMessage {
    /// Decode a message received on a node→hub topic.
    pub fn decode(message: &BusMessage) -> Result<Self, CodecError> {
        let (kind, raw_node) = TopicKind::classify(&message.topic)
            .ok_or_else(|| CodecError::UnknownTopic(message.topic.clone()))?;
        let node_id = NodeId::parse(raw_node).map_err(|e| CodecError::InvalidTopicNode {
            topic: message.topic.clone(),
            reason: e.to_string(),
        })?;
        let body = object_body(&message.payload)?;

        match kind {
            TopicKind::Health => {
                let wire: HeartbeatWire = from_body(body)?;
                check_node(&node_id, wire.node_id.as_deref())?;
                Ok(Self::Heartbeat(Heartbeat {
                    node_id,
                    role: wire.role,
                    sent_at: wire.ts.map(from_epoch_seconds).transpose()?,
                }))
            }
            TopicKind::Trigger => {
                let wire: TriggerWire = from_body(body)?;
                check_node(&node_id, wire.node_id.as_deref())?;
                let fragment_id = wire
                    .fragment_id
                    .unwrap_or_else(|| FragmentId::from(node_id.clone()));
                Ok(Self::FragmentTriggered(FragmentTrigger {
                    node_id,
                    fragment_id,
                    sent_at: wire.ts.map(from_epoch_seconds).transpose()?,
                }))
            }
            TopicKind::Ack => {
                let wire: AckWire = from_body(body)?;
                check_node(&node_id, wire.node_id.as_deref())?;
                let correlation_id = wire
                    .correlation_id
                    .ok_or(CodecError::MissingField("correlation_id"))?;
                Ok(Self::ConfigAck(ConfigAck {
                    node_id,
                    correlation_id,
                    status: wire.status,
                    applied: wire.applied,
                }))
            }
            TopicKind::Config | TopicKind::Unlock => {
                Err(CodecError::UnknownTopic(message.topic.clone()))
            }
        }
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Heartbeat(m) => &m.node_id,
            Self::FragmentTriggered(m) => &m.node_id,
            Self::ConfigAck(m) => &m.node_id,
        }
    }

    /// Encode as a node would send it. Used by simulators and tests.
    #[must_use]
    pub fn encode(&self) -> BusMessage {
        let (kind, body) = match self {
            Self::Heartbeat(m) => {
                let mut body = json!({ "node_id": m.node_id });
                if let Some(role) = m.role {
                    body["role"] = json!(role);
                }
                if let Some(at) = m.sent_at {
                    body["ts"] = json!(to_epoch_seconds(at));
                }
                (TopicKind::Health, body)
            }
            Self::FragmentTriggered(m) => {
                let mut body = json!({ "node_id": m.node_id, "fragment_id": m.fragment_id });
                if let Some(at) = m.sent_at {
                    body["ts"] = json!(to_epoch_seconds(at));
                }
                (TopicKind::Trigger, body)
            }
            Self::ConfigAck(m) => {
                let mut body = json!({
                    "node_id": m.node_id,
                    "correlation_id": m.correlation_id,
                    "applied": m.applied,
                });
                if let Some(status) = &m.status {
                    body["status"] = json!(status);
                }
                (TopicKind::Ack, body)
            }
        };
        BusMessage::new(kind.topic_for(self.node_id()), body.to_string())
    }
}

/// Snapshot published retained on the hub state topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStatePayload {
    pub session_id: Option<SessionId>,
    pub unlocked: bool,
    pub triggered: Vec<FragmentId>,
    pub threshold: usize,
}

/// Anything the hub sends.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    ConfigPush {
        node_id: NodeId,
        correlation_id: CorrelationId,
        payload: Value,
    },
    Unlock {
        node_id: NodeId,
        session_id: SessionId,
    },
    HubState(HubStatePayload),
}

#[derive(Deserialize)]
struct ConfigPushWire {
    correlation_id: CorrelationId,
    payload: Value,
}

#[derive(Deserialize)]
struct UnlockWire {
    session_id: SessionId,
}

impl OutboundCommand {
    #[must_use]
    pub fn encode(&self) -> BusMessage {
        match self {
            Self::ConfigPush {
                node_id,
                correlation_id,
                payload,
            } => BusMessage::new(
                TopicKind::Config.topic_for(node_id),
                json!({ "correlation_id": correlation_id, "payload": payload }).to_string(),
            ),
            Self::Unlock {
                node_id,
                session_id,
            } => BusMessage::new(
                TopicKind::Unlock.topic_for(node_id),
                json!({ "session_id": session_id }).to_string(),
            ),
            Self::HubState(state) => {
                BusMessage::new(hub_state_topic(), json!(state).to_string()).retained()
            }
        }
    }

    /// Decode a hub→node message, as a node would.
    pub fn decode(message: &BusMessage) -> Result<Self, CodecError> {
        if message.topic == hub_state_topic() {
            let state: HubStatePayload = from_body(object_body(&message.payload)?)?;
            return Ok(Self::HubState(state));
        }
        let (kind, raw_node) = TopicKind::classify(&message.topic)
            .ok_or_else(|| CodecError::UnknownTopic(message.topic.clone()))?;
        let node_id = NodeId::parse(raw_node).map_err(|e| CodecError::InvalidTopicNode {
            topic: message.topic.clone(),
            reason: e.to_string(),
        })?;
        let body = object_body(&message.payload)?;
        match kind {
            TopicKind::Config => {
                let wire: ConfigPushWire = from_body(body)?;
                Ok(Self::ConfigPush {
                    node_id,
                    correlation_id: wire.correlation_id,
                    payload: wire.payload,
                })
            }
            TopicKind::Unlock => {
                let wire: UnlockWire = from_body(body)?;
                Ok(Self::Unlock {
                    node_id,
                    session_id: wire.session_id,
                })
            }
            _ => Err(CodecError::UnknownTopic(message.topic.clone())),
        }
    }
}

fn object_body(payload: &str) -> Result<Map<String, Value>, CodecError> {
    if payload.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CodecError::NotAnObject),
        Err(e) => Err(CodecError::Payload(e.to_string())),
    }
}

fn from_body<T: serde::de::DeserializeOwned>(body: Map<String, Value>) -> Result<T, CodecError> {
    serde_json::from_value(Value::Object(body)).map_err(|e| CodecError::Payload(e.to_string()))
}

fn check_node(topic_node: &NodeId, payload_node: Option<&str>) -> Result<(), CodecError> {
    match payload_node {
        Some(claimed) if claimed != topic_node.as_str() => Err(CodecError::NodeMismatch {
            topic: topic_node.to_string(),
            payload: claimed.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Convert float epoch seconds to a UTC timestamp, microsecond precision.
pub fn from_epoch_seconds(ts: f64) -> Result<DateTime<Utc>, CodecError> {
    if !ts.is_finite() || ts < 0.0 {
        return Err(CodecError::Timestamp(ts.to_string()));
    }
    let micros = (ts * 1_000_000.0).round();
    if micros > i64::MAX as f64 {
        return Err(CodecError::Timestamp(ts.to_string()));
    }
    let micros = micros as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| CodecError::Timestamp(ts.to_string()))
}

#[must_use]
pub fn to_epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}
