//! Feedcache Core - Entity Types
//!
//! Pure data structures shared by the storage backends, the cache
//! orchestrator and the remote loader. This crate performs no I/O.

use chrono::{DateTime, Utc};

pub mod config;
pub mod entities;
pub mod error;
pub mod loader;

pub use config::{FeedCacheConfig, StoreBackend};
pub use entities::{CachedFeed, FeedImage, LocalFeedImage};
pub use error::{
    ConfigError, FeedCacheError, FeedCacheResult, RemoteError, StoreError, StoreResult,
};
pub use loader::FeedLoader;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
