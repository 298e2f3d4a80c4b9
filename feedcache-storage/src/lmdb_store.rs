//! LMDB-backed feed store with linked cache and image records.
//!
//! Uses the heed crate (Rust bindings for LMDB) to persist the cached feed
//! as one cache record owning an ordered set of image records.
//!
//! # Schema
//!
//! Two named databases live in the environment:
//! - `caches`: at most one [`CacheRecord`] under a fixed key
//! - `images`: one [`ImageRecord`] per feed entry, keyed by
//!   `[cache_id: 16 bytes][position: u32 big-endian]`
//!
//! The key layout is the ordered to-many relation: a prefix scan over a
//! cache id yields its images in feed order. Removing a cache removes every
//! image under its prefix in the same write transaction.
//!
//! # Thread Safety
//!
//! Each store owns one worker thread that holds the LMDB environment and
//! runs jobs strictly one at a time in the order they were submitted.
//! Callers never block on LMDB I/O; they await a oneshot reply.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedcache_core::{
    CachedFeed, FeedCacheError, LocalFeedImage, StoreError, StoreResult, Timestamp,
};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::store::FeedStore;

/// Key of the single cache record.
const CURRENT_CACHE_KEY: &[u8] = b"current";

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LmdbStoreError {
    fn transaction(e: heed::Error) -> Self {
        Self::Transaction(e.to_string())
    }
}

/// Convert LmdbStoreError to FeedCacheError.
impl From<LmdbStoreError> for FeedCacheError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Deserialization(reason) => StoreError::corrupted(reason).into(),
            other => StoreError::write_failed(other.to_string()).into(),
        }
    }
}

/// The cache entity.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    cache_id: Uuid,
    timestamp: DateTime<Utc>,
    image_count: u32,
}

/// The image entity, with a back-reference to its owning cache.
#[derive(Debug, Serialize, Deserialize)]
struct ImageRecord {
    id: Uuid,
    description: Option<String>,
    location: Option<String>,
    url: Url,
    cache_id: Uuid,
}

impl ImageRecord {
    fn new(image: LocalFeedImage, cache_id: Uuid) -> Self {
        Self {
            id: image.id,
            description: image.description,
            location: image.location,
            url: image.url,
            cache_id,
        }
    }

    fn into_local(self) -> LocalFeedImage {
        LocalFeedImage {
            id: self.id,
            description: self.description,
            location: self.location,
            url: self.url,
        }
    }
}

fn image_key(cache_id: Uuid, position: u32) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..16].copy_from_slice(cache_id.as_bytes());
    key[16..].copy_from_slice(&position.to_be_bytes());
    key
}

/// Handles to the environment and its databases, owned by the worker.
struct RecordTables {
    env: Env,
    caches: Database<Bytes, Bytes>,
    images: Database<Bytes, Bytes>,
}

impl RecordTables {
    /// Delete the current cache record and cascade to its images.
    ///
    /// Returns true if a cache record existed. An undecodable cache record
    /// cannot name its images, so every image record is dropped with it.
    fn remove_cache(&self, wtxn: &mut RwTxn) -> Result<bool, LmdbStoreError> {
        let cache_id = match self
            .caches
            .get(wtxn, CURRENT_CACHE_KEY)
            .map_err(LmdbStoreError::transaction)?
        {
            None => return Ok(false),
            Some(bytes) => serde_json::from_slice::<CacheRecord>(bytes)
                .ok()
                .map(|record| record.cache_id),
        };

        match cache_id {
            Some(cache_id) => {
                let keys: Vec<Vec<u8>> = {
                    let mut keys = Vec::new();
                    let iter = self
                        .images
                        .prefix_iter(wtxn, cache_id.as_bytes())
                        .map_err(LmdbStoreError::transaction)?;
                    for result in iter {
                        let (key, _) = result.map_err(LmdbStoreError::transaction)?;
                        keys.push(key.to_vec());
                    }
                    keys
                };
                for key in &keys {
                    self.images
                        .delete(wtxn, key)
                        .map_err(LmdbStoreError::transaction)?;
                }
            }
            None => {
                warn!("Cache record failed to decode, dropping all image records");
                self.images
                    .clear(wtxn)
                    .map_err(LmdbStoreError::transaction)?;
            }
        }

        self.caches
            .delete(wtxn, CURRENT_CACHE_KEY)
            .map_err(LmdbStoreError::transaction)?;
        Ok(true)
    }

    fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> Result<(), LmdbStoreError> {
        let image_count = u32::try_from(feed.len())
            .map_err(|_| LmdbStoreError::Serialization("feed has too many images".into()))?;

        let mut wtxn = self.env.write_txn().map_err(LmdbStoreError::transaction)?;
        self.remove_cache(&mut wtxn)?;

        let cache_id = Uuid::new_v4();
        for (position, image) in (0..image_count).zip(feed) {
            let value = serde_json::to_vec(&ImageRecord::new(image, cache_id))
                .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
            self.images
                .put(&mut wtxn, &image_key(cache_id, position), &value)
                .map_err(LmdbStoreError::transaction)?;
        }

        let record = CacheRecord {
            cache_id,
            timestamp,
            image_count,
        };
        let value = serde_json::to_vec(&record)
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
        self.caches
            .put(&mut wtxn, CURRENT_CACHE_KEY, &value)
            .map_err(LmdbStoreError::transaction)?;

        wtxn.commit().map_err(LmdbStoreError::transaction)
    }

    fn delete(&self) -> Result<bool, LmdbStoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbStoreError::transaction)?;
        let removed = self.remove_cache(&mut wtxn)?;
        wtxn.commit().map_err(LmdbStoreError::transaction)?;
        Ok(removed)
    }

    fn retrieve(&self) -> Result<Option<CachedFeed>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbStoreError::transaction)?;

        let record: CacheRecord = match self
            .caches
            .get(&rtxn, CURRENT_CACHE_KEY)
            .map_err(LmdbStoreError::transaction)?
        {
            None => return Ok(None),
            Some(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?,
        };

        let mut feed = Vec::with_capacity(record.image_count as usize);
        let iter = self
            .images
            .prefix_iter(&rtxn, record.cache_id.as_bytes())
            .map_err(LmdbStoreError::transaction)?;
        for result in iter {
            let (_, bytes) = result.map_err(LmdbStoreError::transaction)?;
            let image: ImageRecord = serde_json::from_slice(bytes)
                .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;
            feed.push(image.into_local());
        }

        if feed.len() != record.image_count as usize {
            return Err(LmdbStoreError::Deserialization(format!(
                "cache lists {} images but {} were found",
                record.image_count,
                feed.len()
            )));
        }

        Ok(Some(CachedFeed::new(feed, record.timestamp)))
    }
}

type Job = Box<dyn FnOnce(&RecordTables) + Send>;

/// LMDB-backed feed store.
///
/// # Example
///
/// ```ignore
/// use feedcache_storage::{FeedStore, LmdbFeedStore};
///
/// let store = LmdbFeedStore::open("/var/cache/app/feed-lmdb", 10)?;
/// store.insert(feed, Utc::now()).await?;
/// let cached = store.retrieve().await?;
/// ```
pub struct LmdbFeedStore {
    path: PathBuf,
    jobs: mpsc::UnboundedSender<Job>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl LmdbFeedStore {
    /// Open (or create) the LMDB environment at `path` and start the worker.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - The databases cannot be created
    /// - The worker thread cannot be spawned
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(&path)
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(LmdbStoreError::transaction)?;
        let caches: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("caches"))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        let images: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("images"))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(LmdbStoreError::transaction)?;

        let tables = RecordTables {
            env,
            caches,
            images,
        };
        let (jobs, mut receiver) = mpsc::unbounded_channel::<Job>();
        let worker = std::thread::Builder::new()
            .name("feedcache-lmdb".to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job(&tables);
                }
            })?;

        info!(path = %path.display(), max_size_mb, "Opened LMDB feed store");
        Ok(Self {
            path,
            jobs,
            worker: Some(worker),
        })
    }

    /// Directory holding the LMDB environment.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue `job` on the worker and await its result.
    ///
    /// The job is queued before the first suspension point, which is what
    /// gives the store its issue-order guarantee.
    async fn perform<T, F>(&self, job: F, on_closed: fn(String) -> StoreError) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RecordTables) -> StoreResult<T> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(Box::new(move |tables| {
                let _ = reply.send(job(tables));
            }))
            .map_err(|_| on_closed("store worker has shut down".to_string()))?;

        response
            .await
            .map_err(|_| on_closed("store worker dropped the request".to_string()))?
    }
}

impl Drop for LmdbFeedStore {
    /// Closes the job queue and waits for the worker, so the environment is
    /// closed once the store is gone and the path can be reopened.
    fn drop(&mut self) {
        let (closed, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.jobs, closed));
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(path = %self.path.display(), "LMDB worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for LmdbFeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbFeedStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl FeedStore for LmdbFeedStore {
    async fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreResult<()> {
        debug!(path = %self.path.display(), images = feed.len(), "Inserting cached feed");
        self.perform(
            move |tables| {
                tables
                    .insert(feed, timestamp)
                    .map_err(|e| StoreError::write_failed(e.to_string()))
            },
            |reason| StoreError::WriteFailed { reason },
        )
        .await
    }

    async fn delete_cached_feed(&self) -> StoreResult<()> {
        debug!(path = %self.path.display(), "Deleting cached feed");
        self.perform(
            |tables| {
                tables
                    .delete()
                    .map(|_| ())
                    .map_err(|e| StoreError::write_failed(e.to_string()))
            },
            |reason| StoreError::WriteFailed { reason },
        )
        .await
    }

    async fn retrieve(&self) -> StoreResult<Option<CachedFeed>> {
        debug!(path = %self.path.display(), "Retrieving cached feed");
        self.perform(
            |tables| {
                tables.retrieve().map_err(|e| {
                    warn!(error = %e, "Cached feed failed to load");
                    StoreError::corrupted(e.to_string())
                })
            },
            |reason| StoreError::Corrupted { reason },
        )
        .await
    }
}
