//! Store connector and persistence error types.

use thiserror::Error;

/// Errors that can occur while connecting to or writing the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported database type: {0}")]
    UnsupportedEngine(String),

    #[error("invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("no credentials supplied and no admin credentials configured")]
    MissingCredentials,

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("query failed: {0}")]
    Query(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
