//! Unified error taxonomy for strata.
//!
//! Absence of a key is never an error: reads return `Option::None` and
//! conditional writes return `false`. The variants here cover everything a
//! caller must be able to distinguish programmatically: a retriable
//! concurrency conflict, an operation the backend does not implement, a
//! setup-time configuration problem, and hard backend/transport failures
//! with their root cause preserved.

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend does not implement this operation.
    ///
    /// Distinct from an empty result: callers must never receive a silently
    /// degraded answer for an unimplemented operation.
    #[error("NOT_SUPPORTED: {0}")]
    NotSupported(&'static str),

    /// A per-key lock could not be acquired within the configured timeout.
    ///
    /// Recoverable: the write did not happen and may be retried.
    #[error("CONTENDED: key lock not acquired within {timeout_ms}ms")]
    Contended { timeout_ms: u64 },

    /// Malformed option combination, rejected before any I/O.
    #[error("INVALID_OPTIONS: {0}")]
    InvalidOptions(String),

    /// Invalid configuration, rejected at setup time.
    #[error("CONFIG: {0}")]
    Config(String),

    /// Key or value (de)serialization failed.
    #[error("CODEC: {0}")]
    Codec(#[from] serde_json::Error),

    /// Storage backend failure (DDL/DML, pool exhaustion).
    #[error("BACKEND: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// Remote transport failure.
    #[error("TRANSPORT: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Source>,
    },
}

impl Error {
    /// Wrap a storage-layer failure, preserving its cause.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Backend { message: err.to_string(), source: Some(Box::new(err)) }
    }

    /// A storage-layer failure with no underlying cause.
    pub fn backend_msg(message: impl Into<String>) -> Self {
        Error::Backend { message: message.into(), source: None }
    }

    /// Wrap a transport failure, preserving its cause.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Transport { message: err.to_string(), source: Some(Box::new(err)) }
    }

    /// A transport failure with no underlying cause.
    pub fn transport_msg(message: impl Into<String>) -> Self {
        Error::Transport { message: message.into(), source: None }
    }

    /// Whether the operation may be retried without operator intervention.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Contended { .. })
    }
}
