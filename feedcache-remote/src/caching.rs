//! Remote loading with write-through to the local cache.

use std::sync::Arc;

use async_trait::async_trait;
use feedcache_core::{FeedCacheResult, FeedImage, FeedLoader};
use feedcache_storage::LocalFeedLoader;
use tracing::{debug, warn};

/// Loads from `remote` and saves every successful result into `cache`.
///
/// Failed saves are logged and never change the outcome of `load`: the
/// caller still gets the freshly loaded feed. Failed remote loads are
/// returned as-is and leave the cache untouched.
pub struct CachingFeedLoader {
    remote: Arc<dyn FeedLoader>,
    cache: Arc<LocalFeedLoader>,
}

impl CachingFeedLoader {
    pub fn new(remote: Arc<dyn FeedLoader>, cache: Arc<LocalFeedLoader>) -> Self {
        Self { remote, cache }
    }
}

#[async_trait]
impl FeedLoader for CachingFeedLoader {
    async fn load(&self) -> FeedCacheResult<Vec<FeedImage>> {
        let images = self.remote.load().await?;

        let saved = self.cache.save(images.clone(), |result| match result {
            Ok(()) => debug!("Remote feed cached"),
            Err(e) => warn!(error = %e, "Failed to cache remote feed"),
        });
        if let Err(e) = saved.await {
            warn!(error = %e, "Cache save task did not finish");
        }

        Ok(images)
    }
}

impl std::fmt::Debug for CachingFeedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingFeedLoader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedcache_core::{FeedCacheError, RemoteError};
    use feedcache_storage::{FeedStore, JsonFileFeedStore};
    use feedcache_test_utils::fixtures::unique_image;
    use tempfile::TempDir;

    struct StubLoader(FeedCacheResult<Vec<FeedImage>>);

    #[async_trait]
    impl FeedLoader for StubLoader {
        async fn load(&self) -> FeedCacheResult<Vec<FeedImage>> {
            self.0.clone()
        }
    }

    fn make_cache(dir: &TempDir) -> (Arc<dyn FeedStore>, Arc<LocalFeedLoader>) {
        let store: Arc<dyn FeedStore> =
            Arc::new(JsonFileFeedStore::new(dir.path().join("feed-store.json")));
        let cache = Arc::new(LocalFeedLoader::with_system_clock(Arc::clone(&store)));
        (store, cache)
    }

    #[tokio::test]
    async fn test_successful_load_is_cached() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let (_, cache) = make_cache(&temp_dir);
        let images = vec![unique_image(), unique_image()];
        let sut = CachingFeedLoader::new(Arc::new(StubLoader(Ok(images.clone()))), cache.clone());

        assert_eq!(sut.load().await, Ok(images.clone()));
        assert_eq!(cache.load_feed().await, Ok(images));
    }

    #[tokio::test]
    async fn test_failed_load_leaves_cache_untouched() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let (store, cache) = make_cache(&temp_dir);
        let previous = vec![unique_image()];
        cache
            .save_feed(previous.clone())
            .await
            .expect("save should succeed");

        let failure = Err(FeedCacheError::Remote(RemoteError::Connectivity));
        let sut = CachingFeedLoader::new(Arc::new(StubLoader(failure.clone())), cache.clone());

        assert_eq!(sut.load().await, failure);
        let cached = store
            .retrieve()
            .await
            .expect("retrieve should succeed")
            .expect("cache should be found");
        assert_eq!(cached.into_feed_images(), previous);
    }

    #[tokio::test]
    async fn test_cache_failure_is_not_surfaced() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store: Arc<dyn FeedStore> = Arc::new(JsonFileFeedStore::new(
            temp_dir.path().join("missing").join("feed-store.json"),
        ));
        let cache = Arc::new(LocalFeedLoader::with_system_clock(store));
        let images = vec![unique_image()];
        let sut = CachingFeedLoader::new(Arc::new(StubLoader(Ok(images.clone()))), cache);

        assert_eq!(sut.load().await, Ok(images));
    }
}
