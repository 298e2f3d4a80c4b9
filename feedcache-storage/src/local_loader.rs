//! Cache orchestrator: save, load and validate the cached feed.
//!
//! [`LocalFeedLoader`] composes a [`FeedStore`] with [`FeedCachePolicy`]. It
//! owns no persisted state, only a handle to the store and a clock.
//!
//! # Ordering
//!
//! Every operation is queued on a per-loader FIFO before the call returns
//! and runs to completion before the next one starts. `save(a)` followed by
//! `save(b)` therefore always leaves `b` in the store, and a `load` issued
//! after a `save` observes it, whatever the runtime flavor.
//!
//! # Delivery after teardown
//!
//! Queued operations hold a `Weak` handle to the loader. Before every
//! follow-up store call and every completion the handle is upgraded; once
//! the loader has been dropped, results are discarded and nothing is
//! delivered. The store itself still finishes whatever it was doing.
//!
//! A strong handle is never held across a store `.await`, so dropping the
//! loader always takes effect at the next store response.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use chrono::Utc;
use feedcache_core::{
    CachedFeed, FeedCacheResult, FeedImage, FeedLoader, LocalFeedImage, StoreError, StoreResult,
    Timestamp,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::policy::FeedCachePolicy;
use crate::store::FeedStore;

type CurrentDate = Box<dyn Fn() -> Timestamp + Send + Sync>;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Resolves once a queued operation has settled, whether or not it
/// delivered. Resolves to an error if the operation never ran to the end.
pub type Settled = oneshot::Receiver<()>;

const NO_RUNTIME: &str = "no Tokio runtime available";
const NOT_COMPLETED: &str = "cache operation did not complete";

/// State shared between the loader and its in-flight operations.
struct LoaderState {
    store: Arc<dyn FeedStore>,
    current_date: CurrentDate,
}

impl LoaderState {
    fn now(&self) -> Timestamp {
        (self.current_date)()
    }

    /// Apply the load policy to a retrieval result.
    fn loaded_feed(&self, retrieval: StoreResult<Option<CachedFeed>>) -> StoreResult<Vec<FeedImage>> {
        match retrieval? {
            Some(cache) if FeedCachePolicy::validate(cache.timestamp, self.now()) => {
                Ok(cache.into_feed_images())
            }
            Some(cache) => {
                debug!(timestamp = %cache.timestamp, "Cached feed expired, delivering no images");
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Returns true if the retrieved cache must be wiped.
    fn needs_invalidation(&self, retrieval: &StoreResult<Option<CachedFeed>>) -> bool {
        match retrieval {
            Err(e) => {
                warn!(error = %e, "Cached feed unreadable, deleting it");
                true
            }
            Ok(Some(cache)) if !FeedCachePolicy::validate(cache.timestamp, self.now()) => {
                info!(timestamp = %cache.timestamp, "Cached feed expired, deleting it");
                true
            }
            Ok(_) => false,
        }
    }
}

fn to_local(images: Vec<FeedImage>) -> Vec<LocalFeedImage> {
    images.into_iter().map(LocalFeedImage::from).collect()
}

/// Start the worker draining `jobs` one at a time.
///
/// Each job runs on its own task so a panicking completion does not take
/// the queue down with it. The worker exits once the loader, and with it
/// the sender, is gone and the queue is drained.
fn spawn_worker(runtime: &Handle) -> mpsc::UnboundedSender<Job> {
    let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
    runtime.spawn(async move {
        while let Some(job) = queue.recv().await {
            if let Err(e) = tokio::spawn(job).await {
                warn!(error = %e, "Cache operation panicked");
            }
        }
        trace!("Loader dropped, operation queue drained");
    });
    jobs
}

fn enqueue<F>(jobs: &mpsc::UnboundedSender<Job>, operation: F) -> Settled
where
    F: Future<Output = ()> + Send + 'static,
{
    let (done, settled) = oneshot::channel();
    let job: Job = Box::pin(async move {
        operation.await;
        let _ = done.send(());
    });
    if jobs.send(job).is_err() {
        warn!("Operation queue closed, cache operation dropped");
    }
    settled
}

fn settled_now() -> Settled {
    let (done, settled) = oneshot::channel();
    let _ = done.send(());
    settled
}

/// Use-case layer over a [`FeedStore`].
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn FeedStore> = Arc::new(JsonFileFeedStore::new(path));
/// let loader = LocalFeedLoader::new(store, Utc::now);
///
/// loader.save(images, |result| {
///     if let Err(e) = result {
///         eprintln!("cache save failed: {e}");
///     }
/// });
///
/// let feed = loader.load_feed().await?;
/// ```
pub struct LocalFeedLoader {
    state: Arc<LoaderState>,
    jobs: OnceLock<mpsc::UnboundedSender<Job>>,
}

impl LocalFeedLoader {
    /// Create a loader over `store`, reading "now" from `current_date`.
    ///
    /// Construction needs no runtime. The operation queue starts on the
    /// runtime of the first call that uses it.
    pub fn new<F>(store: Arc<dyn FeedStore>, current_date: F) -> Self
    where
        F: Fn() -> Timestamp + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(LoaderState {
                store,
                current_date: Box::new(current_date),
            }),
            jobs: OnceLock::new(),
        }
    }

    /// Create a loader that reads the system clock.
    pub fn with_system_clock(store: Arc<dyn FeedStore>) -> Self {
        Self::new(store, Utc::now)
    }

    fn handles(&self) -> (Weak<LoaderState>, Arc<dyn FeedStore>) {
        (Arc::downgrade(&self.state), Arc::clone(&self.state.store))
    }

    /// The operation queue, started on the current runtime if needed.
    fn queue(&self) -> Option<&mpsc::UnboundedSender<Job>> {
        if let Some(jobs) = self.jobs.get() {
            return Some(jobs);
        }
        match Handle::try_current() {
            Ok(runtime) => Some(self.jobs.get_or_init(|| spawn_worker(&runtime))),
            Err(_) => {
                warn!("{}, cache operation not started", NO_RUNTIME);
                None
            }
        }
    }

    // ========================================================================
    // COMPLETION-BASED OPERATIONS
    // ========================================================================

    /// Replace the cached feed with `images`, timestamped now.
    ///
    /// Deletes the current cache first; if that fails the error is delivered
    /// and no insert is attempted. `completion` is not invoked if the loader
    /// is dropped before the store responds.
    ///
    /// Called outside a Tokio runtime, `completion` receives
    /// [`StoreError::WriteFailed`] immediately and the store is not touched.
    pub fn save<C>(&self, images: Vec<FeedImage>, completion: C) -> Settled
    where
        C: FnOnce(StoreResult<()>) + Send + 'static,
    {
        let Some(jobs) = self.queue() else {
            completion(Err(StoreError::write_failed(NO_RUNTIME)));
            return settled_now();
        };
        let (state, store) = self.handles();
        enqueue(jobs, async move {
            let deletion = store.delete_cached_feed().await;

            let timestamp = {
                let Some(loader) = state.upgrade() else {
                    trace!("Loader dropped before cache deletion completed");
                    return;
                };
                if let Err(e) = deletion {
                    completion(Err(e));
                    return;
                }
                loader.now()
            };

            let count = images.len();
            let insertion = store.insert(to_local(images), timestamp).await;
            if state.upgrade().is_none() {
                trace!("Loader dropped before cache insertion completed");
                return;
            }
            if insertion.is_ok() {
                info!(images = count, %timestamp, "Saved feed to cache");
            }
            completion(insertion);
        })
    }

    /// Load the cached feed.
    ///
    /// Delivers the cached images if the cache is still valid, an empty feed
    /// if it is empty or expired, and the store error if retrieval failed.
    /// Never modifies the store.
    ///
    /// Called outside a Tokio runtime, `completion` receives
    /// [`StoreError::Corrupted`] immediately, the same error a store reports
    /// when it cannot read back.
    pub fn load<C>(&self, completion: C) -> Settled
    where
        C: FnOnce(StoreResult<Vec<FeedImage>>) + Send + 'static,
    {
        let Some(jobs) = self.queue() else {
            completion(Err(StoreError::corrupted(NO_RUNTIME)));
            return settled_now();
        };
        let (state, store) = self.handles();
        enqueue(jobs, async move {
            let retrieval = store.retrieve().await;
            let Some(loader) = state.upgrade() else {
                trace!("Loader dropped before cache retrieval completed");
                return;
            };
            completion(loader.loaded_feed(retrieval));
        })
    }

    /// Delete the cache if it is unreadable or expired.
    ///
    /// Deletion failures are logged and otherwise ignored. Nothing is
    /// deleted if the loader is dropped before retrieval completes.
    pub fn validate_cache(&self) -> Settled {
        self.validate_with(|result| {
            if let Err(e) = result {
                warn!(error = %e, "Failed to delete invalid cached feed");
            }
        })
    }

    fn validate_with<C>(&self, report: C) -> Settled
    where
        C: FnOnce(StoreResult<()>) + Send + 'static,
    {
        let Some(jobs) = self.queue() else {
            report(Err(StoreError::write_failed(NO_RUNTIME)));
            return settled_now();
        };
        let (state, store) = self.handles();
        enqueue(jobs, async move {
            let retrieval = store.retrieve().await;
            let invalid = {
                let Some(loader) = state.upgrade() else {
                    trace!("Loader dropped before cache validation completed");
                    return;
                };
                loader.needs_invalidation(&retrieval)
            };

            let deletion = if invalid {
                store.delete_cached_feed().await
            } else {
                Ok(())
            };
            if state.upgrade().is_none() {
                trace!("Loader dropped before invalid cache deletion completed");
                return;
            }
            report(deletion);
        })
    }

    // ========================================================================
    // FUTURE-BASED OPERATIONS
    // ========================================================================

    /// Async form of [`save`](Self::save). Queued like every other operation.
    pub async fn save_feed(&self, images: Vec<FeedImage>) -> StoreResult<()> {
        let (tx, rx) = oneshot::channel();
        let _settled = self.save(images, move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .unwrap_or_else(|_| Err(StoreError::write_failed(NOT_COMPLETED)))
    }

    /// Async form of [`load`](Self::load).
    pub async fn load_feed(&self) -> StoreResult<Vec<FeedImage>> {
        let (tx, rx) = oneshot::channel();
        let _settled = self.load(move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .unwrap_or_else(|_| Err(StoreError::corrupted(NOT_COMPLETED)))
    }

    /// Async form of [`validate_cache`](Self::validate_cache).
    ///
    /// Unlike the completion form, a failed deletion is returned.
    pub async fn validate_feed_cache(&self) -> StoreResult<()> {
        let (tx, rx) = oneshot::channel();
        let _settled = self.validate_with(move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .unwrap_or_else(|_| Err(StoreError::write_failed(NOT_COMPLETED)))
    }
}

impl std::fmt::Debug for LocalFeedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFeedLoader").finish_non_exhaustive()
    }
}

#[async_trait]
impl FeedLoader for LocalFeedLoader {
    async fn load(&self) -> FeedCacheResult<Vec<FeedImage>> {
        Ok(self.load_feed().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use feedcache_core::StoreError;
    use url::Url;
    use uuid::Uuid;

    struct NullStore;

    #[async_trait]
    impl FeedStore for NullStore {
        async fn insert(&self, _: Vec<LocalFeedImage>, _: Timestamp) -> StoreResult<()> {
            Ok(())
        }

        async fn delete_cached_feed(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn retrieve(&self) -> StoreResult<Option<CachedFeed>> {
            Ok(None)
        }
    }

    fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 14, 9, 26, 53)
            .single()
            .expect("valid date")
    }

    fn state() -> LoaderState {
        LoaderState {
            store: Arc::new(NullStore),
            current_date: Box::new(fixed_now),
        }
    }

    fn cache_aged(age: Duration) -> CachedFeed {
        let image = LocalFeedImage {
            id: Uuid::new_v4(),
            description: None,
            location: None,
            url: Url::parse("https://any-url.com").expect("valid url"),
        };
        CachedFeed::new(vec![image], fixed_now() - age)
    }

    #[test]
    fn test_loaded_feed_maps_valid_cache() {
        let cache = cache_aged(Duration::days(7) - Duration::seconds(1));
        let expected = cache.clone().into_feed_images();

        let loaded = state().loaded_feed(Ok(Some(cache))).expect("load should succeed");
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_loaded_feed_empty_for_expired_cache() {
        let loaded = state()
            .loaded_feed(Ok(Some(cache_aged(Duration::days(7)))))
            .expect("load should succeed");
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_loaded_feed_forwards_error() {
        let err = StoreError::corrupted("bad");
        assert_eq!(state().loaded_feed(Err(err.clone())), Err(err));
    }

    #[test]
    fn test_needs_invalidation() {
        let state = state();
        assert!(state.needs_invalidation(&Err(StoreError::corrupted("bad"))));
        assert!(state.needs_invalidation(&Ok(Some(cache_aged(Duration::days(8))))));
        assert!(!state.needs_invalidation(&Ok(Some(cache_aged(Duration::days(1))))));
        assert!(!state.needs_invalidation(&Ok(None)));
    }

    #[test]
    fn test_save_outside_runtime_delivers_error() {
        let loader = LocalFeedLoader::new(Arc::new(NullStore), fixed_now);
        let (tx, mut rx) = oneshot::channel();

        let mut settled = loader.save(Vec::new(), move |result| {
            let _ = tx.send(result);
        });

        assert!(matches!(rx.try_recv(), Ok(Err(StoreError::WriteFailed { .. }))));
        assert!(settled.try_recv().is_ok());
    }

    #[test]
    fn test_load_outside_runtime_delivers_error() {
        let loader = LocalFeedLoader::new(Arc::new(NullStore), fixed_now);
        let (tx, mut rx) = oneshot::channel();

        let _settled = loader.load(move |result| {
            let _ = tx.send(result);
        });

        assert!(matches!(rx.try_recv(), Ok(Err(StoreError::Corrupted { .. }))));
    }

    #[test]
    fn test_validate_outside_runtime_does_not_panic() {
        let loader = LocalFeedLoader::new(Arc::new(NullStore), fixed_now);
        let mut settled = loader.validate_cache();
        assert!(settled.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_operations_settle_in_issue_order() {
        let loader = LocalFeedLoader::new(Arc::new(NullStore), fixed_now);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let settled: Vec<Settled> = (0..5)
            .map(|i| {
                let order = Arc::clone(&order);
                loader.save(Vec::new(), move |_| {
                    order.lock().expect("lock").push(i);
                })
            })
            .collect();
        for done in settled {
            done.await.expect("operation should settle");
        }

        assert_eq!(*order.lock().expect("lock"), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_feed_loader_trait_on_empty_store() {
        let loader = LocalFeedLoader::new(Arc::new(NullStore), fixed_now);
        let feed = FeedLoader::load(&loader).await.expect("load should succeed");
        assert!(feed.is_empty());
    }
}
