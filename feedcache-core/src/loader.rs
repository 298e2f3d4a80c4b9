//! The feed loading capability shared by the remote and local loaders.

use async_trait::async_trait;

use crate::{FeedCacheResult, FeedImage};

/// Anything that can produce the current feed.
///
/// Implemented by the remote loader (network) and the local loader (cache),
/// so consumers can be handed either one.
#[async_trait]
pub trait FeedLoader: Send + Sync {
    /// Load the feed, in presentation order.
    async fn load(&self) -> FeedCacheResult<Vec<FeedImage>>;
}
