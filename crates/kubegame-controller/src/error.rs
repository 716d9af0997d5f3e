//! Reconciliation error types.

use kubegame_core::{ClusterError, ObjectKey, OwnerError};
use kubegame_persistence::StoreError;
use thiserror::Error;

/// Errors that end a reconciliation early. Every variant is retried by the
/// driver with backoff.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("owner reference error: {0}")]
    Owner(#[from] OwnerError),

    /// A dependency that must exist at this point does not.
    #[error("{kind} {key} is missing")]
    MissingInfrastructure { kind: String, key: ObjectKey },

    /// A create reported a name collision but the object could not be read back.
    #[error("{kind} {key} already exists but could not be read back")]
    Vanished { kind: String, key: ObjectKey },

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("reconciliation deadline exceeded")]
    DeadlineExceeded,
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
