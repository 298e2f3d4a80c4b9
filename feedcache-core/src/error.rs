//! Error types for feed cache operations

use thiserror::Error;

/// Errors reported through the store contract.
///
/// An empty store is not an error: `retrieve` reports it as `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Cached feed is corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("Cache write failed: {reason}")]
    WriteFailed { reason: String },
}

impl StoreError {
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Self::Corrupted {
            reason: reason.into(),
        }
    }

    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }
}

/// Remote loader errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Could not reach the feed server")]
    Connectivity,

    #[error("Feed server returned invalid data")]
    InvalidData,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for the feed cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedCacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for store contract operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for feed cache operations.
pub type FeedCacheResult<T> = Result<T, FeedCacheError>;

// =============================================================================
// TESTS
// =============================================================================
