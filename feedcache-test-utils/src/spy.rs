//! Recording test double for [`FeedStore`].
//!
//! Every call is recorded as a [`ReceivedMessage`] and then parked until the
//! test completes it explicitly with `complete_*`. This lets tests control
//! exactly when (and whether) the store responds, which is what the loader's
//! teardown behavior needs.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use feedcache_core::{CachedFeed, LocalFeedImage, StoreError, StoreResult, Timestamp};
use feedcache_storage::FeedStore;
use tokio::sync::{oneshot, Notify};

/// How long [`FeedStoreSpy::wait_for_messages`] waits before failing the test.
const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// A call observed by the spy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedMessage {
    Deletion,
    Insertion(Vec<LocalFeedImage>, Timestamp),
    Retrieval,
}

type Pending<T> = Vec<Option<oneshot::Sender<StoreResult<T>>>>;

#[derive(Default)]
struct SpyState {
    received: Vec<ReceivedMessage>,
    deletions: Pending<()>,
    insertions: Pending<()>,
    retrievals: Pending<Option<CachedFeed>>,
}

/// Store double that records calls and completes them on demand.
#[derive(Default)]
pub struct FeedStoreSpy {
    state: Mutex<SpyState>,
    changed: Notify,
}

impl FeedStoreSpy {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SpyState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record<T>(
        &self,
        message: ReceivedMessage,
        pending: impl FnOnce(&mut SpyState) -> &mut Pending<T>,
    ) -> oneshot::Receiver<StoreResult<T>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.lock();
            state.received.push(message);
            pending(&mut *state).push(Some(tx));
        }
        self.changed.notify_waiters();
        rx
    }

    /// Messages received so far, in call order.
    pub fn received_messages(&self) -> Vec<ReceivedMessage> {
        self.lock().received.clone()
    }

    /// Wait until at least `count` messages have been received.
    ///
    /// Panics if they do not arrive in time.
    pub async fn wait_for_messages(&self, count: usize) -> Vec<ReceivedMessage> {
        let wait = async {
            loop {
                let changed = self.changed.notified();
                {
                    let state = self.lock();
                    if state.received.len() >= count {
                        return state.received.clone();
                    }
                }
                changed.await;
            }
        };

        match tokio::time::timeout(WAIT_TIMEOUT, wait).await {
            Ok(messages) => messages,
            Err(_) => panic!(
                "expected {} messages, received {:?}",
                count,
                self.received_messages()
            ),
        }
    }

    pub fn complete_deletion(&self, result: StoreResult<()>, at: usize) {
        let sender = take_pending(&mut self.lock().deletions, at, "deletion");
        let _ = sender.send(result);
    }

    pub fn complete_deletion_successfully(&self, at: usize) {
        self.complete_deletion(Ok(()), at);
    }

    pub fn complete_insertion(&self, result: StoreResult<()>, at: usize) {
        let sender = take_pending(&mut self.lock().insertions, at, "insertion");
        let _ = sender.send(result);
    }

    pub fn complete_insertion_successfully(&self, at: usize) {
        self.complete_insertion(Ok(()), at);
    }

    pub fn complete_retrieval(&self, result: StoreResult<Option<CachedFeed>>, at: usize) {
        let sender = take_pending(&mut self.lock().retrievals, at, "retrieval");
        let _ = sender.send(result);
    }

    pub fn complete_retrieval_with_empty_cache(&self, at: usize) {
        self.complete_retrieval(Ok(None), at);
    }

    pub fn complete_retrieval_with_feed(
        &self,
        feed: Vec<LocalFeedImage>,
        timestamp: Timestamp,
        at: usize,
    ) {
        self.complete_retrieval(Ok(Some(CachedFeed::new(feed, timestamp))), at);
    }
}

fn take_pending<T>(
    pending: &mut Pending<T>,
    at: usize,
    kind: &str,
) -> oneshot::Sender<StoreResult<T>> {
    match pending.get_mut(at).and_then(Option::take) {
        Some(sender) => sender,
        None => panic!("no pending {} at index {}", kind, at),
    }
}

#[async_trait]
impl FeedStore for FeedStoreSpy {
    async fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreResult<()> {
        let response = self.record(ReceivedMessage::Insertion(feed, timestamp), |state| {
            &mut state.insertions
        });
        response
            .await
            .unwrap_or_else(|_| Err(StoreError::write_failed("insertion abandoned by spy")))
    }

    async fn delete_cached_feed(&self) -> StoreResult<()> {
        let response = self.record(ReceivedMessage::Deletion, |state| &mut state.deletions);
        response
            .await
            .unwrap_or_else(|_| Err(StoreError::write_failed("deletion abandoned by spy")))
    }

    async fn retrieve(&self) -> StoreResult<Option<CachedFeed>> {
        let response = self.record(ReceivedMessage::Retrieval, |state| &mut state.retrievals);
        response
            .await
            .unwrap_or_else(|_| Err(StoreError::corrupted("retrieval abandoned by spy")))
    }
}

impl std::fmt::Debug for FeedStoreSpy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStoreSpy")
            .field("received", &self.lock().received)
            .finish_non_exhaustive()
    }
}
