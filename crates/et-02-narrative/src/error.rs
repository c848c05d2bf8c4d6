//! Error types for the Narrative State Machine

use shared_bus::TransportError;
use shared_types::{SessionId, ValidationError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrativeError {
    /// Trigger or command rejected; session untouched
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Session is unlocked but the unlock command could not be published.
    /// The decision stands; the retained hub state still reports it.
    #[error("Unlock of session {session_id} decided but not delivered: {source}")]
    UnlockDelivery {
        session_id: SessionId,
        #[source]
        source: TransportError,
    },
}

pub type NarrativeResult<T> = Result<T, NarrativeError>;
