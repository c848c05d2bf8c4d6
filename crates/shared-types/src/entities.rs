//! # Core Domain Entities
//!
//! Identifiers and small value types shared by every hub subsystem.
//!
//! Identifiers are newtypes over `String` (or `Uuid` for correlation ids) so a
//! node id can never be passed where a fragment id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ValidationError;

/// Maximum accepted length for any textual identifier.
pub const MAX_ID_LEN: usize = 64;

fn validate_id(kind: &'static str, raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() || raw.len() > MAX_ID_LEN {
        return Err(ValidationError::MalformedIdentifier {
            kind,
            value: raw.chars().take(MAX_ID_LEN).collect(),
        });
    }
    // Topic segments must stay addressable and log lines splittable.
    if raw
        .chars()
        .any(|c| matches!(c, '/' | '+' | '#' | ',' | '"') || c.is_whitespace() || c.is_control())
    {
        return Err(ValidationError::MalformedIdentifier {
            kind,
            value: raw.to_string(),
        });
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate an identifier.
            pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
                let raw = raw.into();
                validate_id($kind, &raw)?;
                Ok(Self(raw))
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

string_id!(
    /// Identity of a registered device (e.g. `whisper-1`, `mystery`).
    NodeId,
    "node id"
);

string_id!(
    /// Identity of a narrative fragment owned by a whisper node.
    FragmentId,
    "fragment id"
);

string_id!(
    /// Identity of a narrative session, normally the active content pack name.
    SessionId,
    "session id"
);

impl From<NodeId> for FragmentId {
    /// Each whisper node owns exactly one fragment unless told otherwise.
    fn from(node: NodeId) -> Self {
        Self(node.0)
    }
}

/// Token pairing one config push to one node with its acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Allocate a fresh random correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CorrelationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ValidationError::MalformedIdentifier {
                kind: "correlation id",
                value: s.chars().take(MAX_ID_LEN).collect(),
            })
    }
}

/// Role a node plays in the installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Plays a narrative fragment when a visitor comes close.
    Whisper,
    /// Plays the finale once enough fragments were heard.
    Mystery,
}

impl NodeRole {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whisper => "whisper",
            Self::Mystery => "mystery",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whisper" => Ok(Self::Whisper),
            "mystery" => Ok(Self::Mystery),
            other => Err(ValidationError::UnknownRole {
                value: other.to_string(),
            }),
        }
    }
}

/// Liveness derived from heartbeat recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessClass {
    /// Heard from within one heartbeat interval.
    Online,
    /// Missed at least one heartbeat but not yet considered gone.
    Stale,
    /// Silent for `offline_factor` intervals, or never heard from.
    Offline,
}
