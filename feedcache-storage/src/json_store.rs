//! File-backed feed store.
//!
//! Persists the cached feed as one JSON document. Each write goes to a
//! uniquely named temp file in the same directory that is then renamed over
//! the target, so readers never observe a half-written document.
//!
//! # Concurrency
//!
//! Every instance owns a fair `tokio::sync::RwLock`. `retrieve` takes the
//! shared side and may run alongside other reads; `insert` and
//! `delete_cached_feed` take the exclusive side. Waiters are queued FIFO,
//! so mutations complete in issue order.
//!
//! Mutations run on the blocking pool and carry their write guard with
//! them. Dropping an `insert` or `delete_cached_feed` future mid-flight does
//! not release the lock until the file system work has finished.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use feedcache_core::{CachedFeed, LocalFeedImage, StoreError, StoreResult, Timestamp};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::store::FeedStore;

/// On-disk document shape.
#[derive(Debug, Serialize, Deserialize)]
struct FeedDocument {
    images: Vec<LocalFeedImage>,
    timestamp: Timestamp,
}

impl From<FeedDocument> for CachedFeed {
    fn from(document: FeedDocument) -> Self {
        CachedFeed::new(document.images, document.timestamp)
    }
}

/// Write `bytes` to a fresh temp file next to `path`, then rename it over `path`.
fn write_document(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if path.file_name().is_none() {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "path does not name a file",
        ));
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn remove_document(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Feed store persisting one JSON document at a fixed path.
///
/// # Example
///
/// ```ignore
/// let store = JsonFileFeedStore::new("/var/cache/app/feed-store.json");
/// store.insert(feed, Utc::now()).await?;
/// let cached = store.retrieve().await?;
/// ```
#[derive(Debug)]
pub struct JsonFileFeedStore {
    path: PathBuf,
    queue: Arc<RwLock<()>>,
}

impl JsonFileFeedStore {
    /// Create a store for the document at `path`.
    ///
    /// Nothing is touched on disk until the first operation. The parent
    /// directory is not created: inserting into a missing directory fails,
    /// as does inserting at a path with no file name (such as one ending
    /// in `..`).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            queue: Arc::new(RwLock::new(())),
        }
    }

    /// Location of the JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `mutation` on the blocking pool while holding the write side.
    async fn mutate<F>(&self, mutation: F) -> StoreResult<()>
    where
        F: FnOnce(&Path) -> std::io::Result<()> + Send + 'static,
    {
        let guard = Arc::clone(&self.queue).write_owned().await;
        let path = self.path.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            mutation(&path)
        })
        .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StoreError::write_failed(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
            Err(e) => Err(StoreError::write_failed(format!(
                "{}: write task failed: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl FeedStore for JsonFileFeedStore {
    async fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreResult<()> {
        debug!(path = %self.path.display(), images = feed.len(), "Inserting cached feed");

        let document = FeedDocument {
            images: feed,
            timestamp,
        };
        let bytes = serde_json::to_vec(&document)
            .map_err(|e| StoreError::write_failed(format!("encode failed: {}", e)))?;

        self.mutate(move |path| write_document(path, &bytes)).await
    }

    async fn delete_cached_feed(&self) -> StoreResult<()> {
        debug!(path = %self.path.display(), "Deleting cached feed");
        self.mutate(remove_document).await
    }

    async fn retrieve(&self) -> StoreResult<Option<CachedFeed>> {
        let _guard = self.queue.read().await;
        debug!(path = %self.path.display(), "Retrieving cached feed");

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::corrupted(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        match serde_json::from_slice::<FeedDocument>(&bytes) {
            Ok(document) => Ok(Some(document.into())),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cached feed failed to decode");
                Err(StoreError::corrupted(e.to_string()))
            }
        }
    }
}
