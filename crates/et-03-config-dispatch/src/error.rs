//! Error types for the Config Dispatcher

use shared_bus::TransportError;
use shared_types::{CorrelationId, ValidationError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Unknown target node or invalid payload; nothing was sent
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Publish failed; the request never became pending
    #[error("Config push not published: {0}")]
    Transport(#[from] TransportError),

    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("No push with correlation id {0}")]
    UnknownCorrelation(CorrelationId),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
