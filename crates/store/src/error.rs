//! Store-layer error types.
//!
//! Driver errors are carried unchanged; translation into the caller-facing
//! taxonomy happens exactly once, in the `From<StoreError>` conversion, so
//! the root cause survives to the caller.

use tokio_rusqlite::rusqlite;

/// Errors raised by the persistent store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Invalid store configuration, rejected before any I/O.
    #[error("invalid store configuration: {0}")]
    Config(String),

    /// Malformed table schema (missing column name/type, bad cache name).
    #[error("invalid table schema: {0}")]
    InvalidSchema(String),

    /// The backing table is required but absent and creation was disabled.
    #[error("table {0} does not exist and create-on-start is disabled")]
    MissingTable(String),

    /// A key stripe could not be acquired within the configured timeout.
    ///
    /// Recoverable: nothing was written and the caller may retry.
    #[error("key lock not acquired within {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(tokio_rusqlite::Error),

    /// A stored row could not be decoded back into an entry.
    #[error("corrupt row for id {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}

impl From<tokio_rusqlite::Error<StoreError>> for StoreError {
    fn from(err: tokio_rusqlite::Error<StoreError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => StoreError::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => StoreError::Database(tokio_rusqlite::Error::Close(c)),
            _ => StoreError::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        StoreError::Database(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<StoreError> for strata_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { timeout_ms } => strata_core::Error::Contended { timeout_ms },
            StoreError::Config(msg) | StoreError::InvalidSchema(msg) => strata_core::Error::Config(msg),
            other => strata_core::Error::backend(other),
        }
    }
}
