//! Error types for the kubegame object store.

use kubegame_core::ClusterError;
use thiserror::Error;

/// Result type alias for object store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during object store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid object: {0}")]
    Invalid(String),
}

impl From<StateError> for ClusterError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(key) => ClusterError::NotFound(key),
            StateError::Invalid(reason) => ClusterError::Invalid(reason),
            StateError::Serialize(reason) | StateError::Deserialize(reason) => {
                ClusterError::Codec(reason)
            }
            other => ClusterError::Transport(other.to_string()),
        }
    }
}
