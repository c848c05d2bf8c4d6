//! # Event Records
//!
//! Append-only records of every notable hub occurrence, plus the persisted
//! line format consumed by the storage collaborator:
//!
//! ```text
//! timestamp,eventType,nodeId?,detailJSON
//! 2025-01-01T12:00:00.000000Z,fragment_triggered,whisper-1,"{""fragment_id"":""whisper-1""}"
//! ```
//!
//! The detail column is always CSV-quoted; inner quotes are doubled.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::entities::NodeId;

/// Header written at the top of every log file.
pub const LOG_HEADER: &str = "timestamp,event,node_id,detail";

/// Kinds of events the hub records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    HeartbeatReceived,
    FragmentTriggered,
    NarrativeUnlocked,
    ConfigPushOk,
    ConfigPushTimeout,
    AdminAction,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 6] = [
        Self::HeartbeatReceived,
        Self::FragmentTriggered,
        Self::NarrativeUnlocked,
        Self::ConfigPushOk,
        Self::ConfigPushTimeout,
        Self::AdminAction,
    ];

    /// Wire name used in the persisted log.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeartbeatReceived => "heartbeat_received",
            Self::FragmentTriggered => "fragment_triggered",
            Self::NarrativeUnlocked => "narrative_unlocked",
            Self::ConfigPushOk => "config_push_ok",
            Self::ConfigPushTimeout => "config_push_timeout",
            Self::AdminAction => "admin_action",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = LogLineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| LogLineError::UnknownKind(s.to_string()))
    }
}

/// One immutable log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub node_id: Option<NodeId>,
    pub detail: serde_json::Value,
}

impl EventRecord {
    /// Create a record with no node and an empty detail object.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            timestamp,
            kind,
            node_id: None,
            detail: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach the node this event concerns.
    #[must_use]
    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Attach a detail payload.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    /// Render the persisted line (without trailing newline).
    #[must_use]
    pub fn to_log_line(&self) -> String {
        let detail = self.detail.to_string().replace('"', "\"\"");
        format!(
            "{},{},{},\"{}\"",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.kind,
            self.node_id.as_ref().map(NodeId::as_str).unwrap_or(""),
            detail
        )
    }

    /// Parse a persisted line back into a record.
    pub fn parse_log_line(line: &str) -> Result<Self, LogLineError> {
        let mut parts = line.splitn(4, ',');
        let (Some(ts), Some(kind), Some(node), Some(detail)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(LogLineError::MissingColumns);
        };

        let timestamp = DateTime::parse_from_rfc3339(ts)
            .map_err(|e| LogLineError::Timestamp(e.to_string()))?
            .with_timezone(&Utc);
        let kind: EventKind = kind.parse()?;
        let node_id = if node.is_empty() {
            None
        } else {
            Some(NodeId::parse(node).map_err(|e| LogLineError::NodeId(e.to_string()))?)
        };

        let detail = detail.trim_end_matches(['\r', '\n']);
        let raw = match detail
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
        {
            Some(inner) => inner.replace("\"\"", "\""),
            None => detail.to_string(),
        };
        let detail = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&raw).map_err(|e| LogLineError::Detail(e.to_string()))?
        };

        Ok(Self {
            timestamp,
            kind,
            node_id,
            detail,
        })
    }
}

/// Failure to parse a persisted log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogLineError {
    #[error("Log line has fewer than four columns")]
    MissingColumns,
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),
    #[error("Unknown event kind: {0}")]
    UnknownKind(String),
    #[error("Invalid node id: {0}")]
    NodeId(String),
    #[error("Invalid detail JSON: {0}")]
    Detail(String),
}
