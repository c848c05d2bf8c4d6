//! # Error Types
//!
//! Validation errors shared across subsystems. These are local rejections:
//! no state is mutated and the caller decides whether to log or surface them.

use thiserror::Error;

use crate::entities::{NodeId, NodeRole};

/// A request was rejected before it touched any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Identifier is empty, too long, or contains topic separators.
    #[error("Malformed {kind}: {value:?}")]
    MalformedIdentifier { kind: &'static str, value: String },

    /// Role string is neither `whisper` nor `mystery`.
    #[error("Unknown node role: {value:?}")]
    UnknownRole { value: String },

    /// Node id is not in the roster.
    #[error("Unknown node: {node_id}")]
    UnknownNode { node_id: NodeId },

    /// Re-registration attempted with a different role.
    #[error("Node {node_id} is registered as {existing}, refusing {requested}")]
    RoleConflict {
        node_id: NodeId,
        existing: NodeRole,
        requested: NodeRole,
    },

    /// Operation requires a node of another role.
    #[error("Node {node_id} has role {actual}, expected {expected}")]
    WrongRole {
        node_id: NodeId,
        expected: NodeRole,
        actual: NodeRole,
    },

    /// No narrative session has been activated.
    #[error("No active narrative session")]
    NoActiveSession,

    /// Node is registered but does not take part in the active session.
    #[error("Node {node_id} is not a participant of the active session")]
    NotInSession { node_id: NodeId },

    /// Session already unlocked; only a reset accepts triggers again.
    #[error("Narrative session already unlocked")]
    AlreadyUnlocked,

    /// Field-level validation failure on a configuration value.
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ValidationError {
    /// Shorthand for field-level failures.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
