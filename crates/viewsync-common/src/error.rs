//! Error types for viewsync
//!
//! One taxonomy covers the counter pipeline: cache faults, pending-index
//! faults, durable-store faults and configuration problems. None of the
//! pipeline variants are meant to reach an end user; the read path degrades
//! and the sync worker retries on the next tick.

use crate::types::EntityId;
use thiserror::Error;

/// Common result type for viewsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for viewsync
#[derive(Debug, Error)]
pub enum Error {
    // Counter cache
    #[error("counter cache unavailable: {0}")]
    CacheUnavailable(String),

    // Pending-sync index
    #[error("pending index unavailable: {0}")]
    IndexUnavailable(String),

    // Durable store
    #[error("durable store error: {0}")]
    Store(String),

    #[error("entity not found: {0}")]
    NotFound(EntityId),

    #[error("operation timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    // Configuration / IO
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a cache-unavailable error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    /// Create an index-unavailable error
    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexUnavailable(msg.into())
    }

    /// Create a durable store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if a later attempt may succeed without operator action
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CacheUnavailable(_)
                | Self::IndexUnavailable(_)
                | Self::Store(_)
                | Self::Timeout { .. }
                | Self::Io(_)
        )
    }

    /// HTTP status code for handlers that do surface the error
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::CacheUnavailable(_)
            | Self::IndexUnavailable(_)
            | Self::Store(_)
            | Self::Timeout { .. } => 503,
            Self::Configuration(_) | Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => {
                500
            }
        }
    }
}
