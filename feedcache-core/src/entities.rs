//! Feed image records and the cached snapshot

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Feed image as seen by the presentation layer and the remote loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedImage {
    pub id: Uuid,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Url,
}

impl FeedImage {
    pub fn new(
        id: Uuid,
        description: Option<String>,
        location: Option<String>,
        url: Url,
    ) -> Self {
        Self {
            id,
            description,
            location,
            url,
        }
    }
}

/// Feed image as persisted by a cache store.
///
/// Mirrors [`FeedImage`] field for field so the cache representation can
/// evolve independently of the domain model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalFeedImage {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub url: Url,
}

impl From<FeedImage> for LocalFeedImage {
    fn from(image: FeedImage) -> Self {
        Self {
            id: image.id,
            description: image.description,
            location: image.location,
            url: image.url,
        }
    }
}

impl From<LocalFeedImage> for FeedImage {
    fn from(local: LocalFeedImage) -> Self {
        Self {
            id: local.id,
            description: local.description,
            location: local.location,
            url: local.url,
        }
    }
}

/// Everything a store currently knows: one ordered feed and the moment it
/// was captured. Snapshots are always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFeed {
    pub feed: Vec<LocalFeedImage>,
    pub timestamp: Timestamp,
}

impl CachedFeed {
    pub fn new(feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> Self {
        Self { feed, timestamp }
    }

    /// Convert the cached images back into domain images, keeping order.
    pub fn into_feed_images(self) -> Vec<FeedImage> {
        self.feed.into_iter().map(FeedImage::from).collect()
    }
}
