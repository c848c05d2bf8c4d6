//! Error types for the Node Registry

use shared_types::ValidationError;
use thiserror::Error;

/// Node Registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Request rejected before touching the roster
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
