//! Store contract shared by every cache backend.
//!
//! A [`FeedStore`] persists at most one [`CachedFeed`]. Backends differ in
//! durability and concurrency characteristics but must be observably
//! identical through this trait.

use async_trait::async_trait;
use feedcache_core::{CachedFeed, LocalFeedImage, StoreResult, Timestamp};

/// Persistence backend for the cached feed.
///
/// # Ordering
///
/// Operations issued against one store instance take effect in a single
/// total order matching issue order. Implementations fix their place in
/// that order synchronously, on the first poll of the returned future and
/// before any suspension point, so a caller that issues `a` then `b` always
/// observes `a` before `b`.
///
/// # Errors
///
/// - `retrieve` returns `Ok(None)` for an empty store and
///   [`StoreError::Corrupted`](feedcache_core::StoreError::Corrupted) when
///   stored data cannot be read back.
/// - `insert` and `delete_cached_feed` return
///   [`StoreError::WriteFailed`](feedcache_core::StoreError::WriteFailed)
///   on any I/O or transaction failure.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Replace any existing snapshot with `feed` captured at `timestamp`.
    async fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreResult<()>;

    /// Remove the snapshot. Deleting an empty store succeeds.
    async fn delete_cached_feed(&self) -> StoreResult<()>;

    /// Read the current snapshot without modifying it.
    async fn retrieve(&self) -> StoreResult<Option<CachedFeed>>;
}
