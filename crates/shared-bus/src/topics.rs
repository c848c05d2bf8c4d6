//! # Topics
//!
//! Topic layout of the EchoTrace bus and MQTT-style subscription patterns.
//!
//! ```text
//! ECHOTRACE/health/<node>    node → hub   heartbeat
//! ECHOTRACE/trigger/<node>   node → hub   fragment triggered
//! ECHOTRACE/ack/<node>       node → hub   config acknowledgement
//! ECHOTRACE/config/<node>    hub → node   config push
//! ECHOTRACE/unlock/<node>    hub → node   unlock command
//! ECHOTRACE/state/hub        hub → all    retained narrative snapshot
//! ```

use std::fmt;

use shared_types::NodeId;

use crate::TransportError;

/// Root segment of every topic.
pub const PREFIX: &str = "ECHOTRACE";

/// Per-node topic families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Health,
    Trigger,
    Ack,
    Config,
    Unlock,
}

impl TopicKind {
    /// Second topic segment for this family.
    #[must_use]
    pub fn segment(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Trigger => "trigger",
            Self::Ack => "ack",
            Self::Config => "config",
            Self::Unlock => "unlock",
        }
    }

    /// Concrete topic for one node.
    #[must_use]
    pub fn topic_for(&self, node_id: &NodeId) -> String {
        format!("{PREFIX}/{}/{}", self.segment(), node_id)
    }

    /// Pattern matching this family for every node.
    #[must_use]
    pub fn wildcard(&self) -> TopicPattern {
        TopicPattern {
            segments: vec![
                Segment::Literal(PREFIX.to_string()),
                Segment::Literal(self.segment().to_string()),
                Segment::SingleLevel,
            ],
        }
    }

    /// Split a concrete topic into its family and raw node segment.
    #[must_use]
    pub fn classify(topic: &str) -> Option<(Self, &str)> {
        let rest = topic.strip_prefix(PREFIX)?.strip_prefix('/')?;
        let (family, node) = rest.split_once('/')?;
        if node.is_empty() || node.contains('/') {
            return None;
        }
        let kind = match family {
            "health" => Self::Health,
            "trigger" => Self::Trigger,
            "ack" => Self::Ack,
            "config" => Self::Config,
            "unlock" => Self::Unlock,
            _ => return None,
        };
        Some((kind, node))
    }
}

/// Retained narrative snapshot topic.
#[must_use]
pub fn hub_state_topic() -> String {
    format!("{PREFIX}/state/hub")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    /// `+`
    SingleLevel,
    /// `#`, only valid as the last segment
    MultiLevel,
}

/// Subscription filter with `+` (one level) and `#` (rest) wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse a pattern such as `ECHOTRACE/+/whisper-1` or `ECHOTRACE/#`.
    pub fn new(pattern: &str) -> Result<Self, TransportError> {
        if pattern.is_empty() {
            return Err(TransportError::InvalidPattern(pattern.to_string()));
        }
        let raw: Vec<&str> = pattern.split('/').collect();
        let last = raw.len() - 1;
        let mut segments = Vec::with_capacity(raw.len());
        for (i, seg) in raw.into_iter().enumerate() {
            let parsed = match seg {
                "+" => Segment::SingleLevel,
                "#" if i == last => Segment::MultiLevel,
                s if s.contains('+') || s.contains('#') => {
                    return Err(TransportError::InvalidPattern(pattern.to_string()))
                }
                s => Segment::Literal(s.to_string()),
            };
            segments.push(parsed);
        }
        Ok(Self { segments })
    }

    /// Pattern that matches every topic.
    #[must_use]
    pub fn all() -> Self {
        Self {
            segments: vec![Segment::MultiLevel],
        }
    }

    /// Pattern that matches exactly one topic.
    #[must_use]
    pub fn exact(topic: &str) -> Self {
        Self {
            segments: topic
                .split('/')
                .map(|s| Segment::Literal(s.to_string()))
                .collect(),
        }
    }

    /// Check whether a concrete topic matches.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        let mut levels = topic.split('/');
        for segment in &self.segments {
            match segment {
                Segment::MultiLevel => return true,
                Segment::SingleLevel => {
                    if levels.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(lit) => match levels.next() {
                    Some(level) if level == lit => {}
                    _ => return false,
                },
            }
        }
        levels.next().is_none()
    }
}

/// Renders the broker filter string, e.g. `ECHOTRACE/health/+`.
impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match segment {
                Segment::Literal(lit) => f.write_str(lit)?,
                Segment::SingleLevel => f.write_str("+")?,
                Segment::MultiLevel => f.write_str("#")?,
            }
        }
        Ok(())
    }
}
