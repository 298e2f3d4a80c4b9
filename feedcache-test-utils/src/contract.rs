//! Shared behavior every [`FeedStore`] backend must show.
//!
//! Each function expects a fresh, empty store and panics on the first
//! deviation. Backend test suites call them one by one so a failure names
//! the broken behavior.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use feedcache_core::{CachedFeed, LocalFeedImage, StoreResult, Timestamp};
use feedcache_storage::FeedStore;

use crate::fixtures::{fixed_now, unique_feed};

/// A boxed store operation, as accepted by [`completion_order`].
pub type StoreOp<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Drive `ops` concurrently and return their indices in completion order.
///
/// Operations are first polled in index order, so index order is also issue
/// order. Every pass polls the remaining ops in that same order.
pub async fn completion_order(ops: Vec<StoreOp<'_>>) -> Vec<usize> {
    let mut ops: Vec<Option<StoreOp<'_>>> = ops.into_iter().map(Some).collect();
    let mut order = Vec::with_capacity(ops.len());

    std::future::poll_fn(|cx| {
        for (index, slot) in ops.iter_mut().enumerate() {
            if let Some(op) = slot {
                if op.as_mut().poll(cx).is_ready() {
                    order.push(index);
                    *slot = None;
                }
            }
        }
        if ops.iter().all(Option::is_none) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    })
    .await;

    order
}

async fn insert(store: &dyn FeedStore, feed: Vec<LocalFeedImage>, timestamp: Timestamp) {
    store
        .insert(feed, timestamp)
        .await
        .expect("insert should succeed");
}

async fn retrieve(store: &dyn FeedStore) -> StoreResult<Option<CachedFeed>> {
    store.retrieve().await
}

pub async fn assert_retrieve_delivers_empty_on_empty_cache(store: &dyn FeedStore) {
    assert_eq!(retrieve(store).await, Ok(None));
}

pub async fn assert_retrieve_has_no_side_effects_on_empty_cache(store: &dyn FeedStore) {
    assert_eq!(retrieve(store).await, Ok(None));
    assert_eq!(retrieve(store).await, Ok(None));
}

pub async fn assert_retrieve_delivers_found_values_on_non_empty_cache(store: &dyn FeedStore) {
    let (_, feed) = unique_feed();
    let timestamp = fixed_now();

    insert(store, feed.clone(), timestamp).await;

    assert_eq!(
        retrieve(store).await,
        Ok(Some(CachedFeed::new(feed, timestamp)))
    );
}

pub async fn assert_retrieve_has_no_side_effects_on_non_empty_cache(store: &dyn FeedStore) {
    let (_, feed) = unique_feed();
    let timestamp = fixed_now();
    let expected = Ok(Some(CachedFeed::new(feed.clone(), timestamp)));

    insert(store, feed, timestamp).await;

    assert_eq!(retrieve(store).await, expected);
    assert_eq!(retrieve(store).await, expected);
}

pub async fn assert_insert_delivers_no_error_on_empty_cache(store: &dyn FeedStore) {
    let (_, feed) = unique_feed();
    assert_eq!(store.insert(feed, fixed_now()).await, Ok(()));
}

pub async fn assert_insert_delivers_no_error_on_non_empty_cache(store: &dyn FeedStore) {
    let (_, first) = unique_feed();
    let (_, second) = unique_feed();

    insert(store, first, fixed_now()).await;

    assert_eq!(store.insert(second, fixed_now()).await, Ok(()));
}

pub async fn assert_insert_overrides_previously_inserted_values(store: &dyn FeedStore) {
    let (_, first) = unique_feed();
    let (_, latest) = unique_feed();
    let latest_timestamp = fixed_now() + chrono::Duration::hours(1);

    insert(store, first, fixed_now()).await;
    insert(store, latest.clone(), latest_timestamp).await;

    assert_eq!(
        retrieve(store).await,
        Ok(Some(CachedFeed::new(latest, latest_timestamp)))
    );
}

pub async fn assert_delete_delivers_no_error_on_empty_cache(store: &dyn FeedStore) {
    assert_eq!(store.delete_cached_feed().await, Ok(()));
}

pub async fn assert_delete_has_no_side_effects_on_empty_cache(store: &dyn FeedStore) {
    store
        .delete_cached_feed()
        .await
        .expect("delete should succeed");

    assert_eq!(retrieve(store).await, Ok(None));
}

pub async fn assert_delete_delivers_no_error_on_non_empty_cache(store: &dyn FeedStore) {
    let (_, feed) = unique_feed();
    insert(store, feed, fixed_now()).await;

    assert_eq!(store.delete_cached_feed().await, Ok(()));
}

pub async fn assert_delete_empties_previously_inserted_cache(store: &dyn FeedStore) {
    let (_, feed) = unique_feed();
    insert(store, feed, fixed_now()).await;

    store
        .delete_cached_feed()
        .await
        .expect("delete should succeed");

    assert_eq!(retrieve(store).await, Ok(None));
}

/// Mutations issued together complete in issue order, and the final state
/// is the one the last mutation produced.
pub async fn assert_side_effects_run_serially(store: &dyn FeedStore) {
    let (_, first) = unique_feed();
    let (_, last) = unique_feed();
    let timestamp = fixed_now();

    let mut ops: Vec<StoreOp<'_>> = Vec::with_capacity(3);
    ops.push(Box::pin(async {
        store
            .insert(first, timestamp)
            .await
            .expect("first insert should succeed");
    }));
    ops.push(Box::pin(async {
        store
            .delete_cached_feed()
            .await
            .expect("delete should succeed");
    }));
    ops.push(Box::pin(async {
        store
            .insert(last.clone(), timestamp)
            .await
            .expect("last insert should succeed");
    }));
    let order = completion_order(ops).await;

    assert_eq!(order, vec![0, 1, 2]);
    assert_eq!(
        retrieve(store).await,
        Ok(Some(CachedFeed::new(last, timestamp)))
    );
}
