//! Feedcache Storage - Store Contract, Backends and Cache Orchestrator
//!
//! Defines the persistence abstraction for the cached feed, its two
//! backends, the staleness policy and the use-case layer that ties them
//! together.
//!
//! - [`FeedStore`]: the insert / delete / retrieve contract
//! - [`JsonFileFeedStore`]: one JSON document on disk
//! - [`LmdbFeedStore`]: linked cache and image records in LMDB
//! - [`FeedCachePolicy`]: the 7-day validity window
//! - [`LocalFeedLoader`]: save, load and validate on top of a store

pub mod json_store;
pub mod lmdb_store;
pub mod local_loader;
pub mod policy;
pub mod store;

use std::sync::Arc;

use feedcache_core::{FeedCacheConfig, FeedCacheResult, StoreBackend};
use tracing::info;

pub use json_store::JsonFileFeedStore;
pub use lmdb_store::{LmdbFeedStore, LmdbStoreError};
pub use local_loader::{LocalFeedLoader, Settled};
pub use policy::FeedCachePolicy;
pub use store::FeedStore;

/// Open the backend selected by `config`.
///
/// The LMDB backend creates its environment directory; the JSON backend
/// touches nothing until the first operation.
pub fn open_store(config: &FeedCacheConfig) -> FeedCacheResult<Arc<dyn FeedStore>> {
    config.validate()?;
    info!(
        backend = ?config.backend,
        path = %config.store_path.display(),
        "Opening feed store"
    );

    let store: Arc<dyn FeedStore> = match config.backend {
        StoreBackend::JsonFile => Arc::new(JsonFileFeedStore::new(&config.store_path)),
        StoreBackend::Lmdb => Arc::new(LmdbFeedStore::open(
            &config.store_path,
            config.lmdb_map_size_mb,
        )?),
    };
    Ok(store)
}
