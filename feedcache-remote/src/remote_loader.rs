//! Feed loader backed by the feed endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use feedcache_core::{FeedCacheResult, FeedImage, FeedLoader, RemoteError};
use tracing::{debug, warn};
use url::Url;

use crate::http::HttpClient;
use crate::mapper::FeedItemsMapper;

/// Loads the feed from `url` through an [`HttpClient`].
pub struct RemoteFeedLoader {
    url: Url,
    client: Arc<dyn HttpClient>,
}

impl RemoteFeedLoader {
    pub fn new(url: Url, client: Arc<dyn HttpClient>) -> Self {
        Self { url, client }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch and map the feed.
    ///
    /// A request that never produced a response is
    /// [`RemoteError::Connectivity`]; any response that does not map is
    /// [`RemoteError::InvalidData`].
    pub async fn fetch(&self) -> Result<Vec<FeedImage>, RemoteError> {
        let response = self.client.get(&self.url).await.map_err(|e| {
            warn!(error = %e, "Feed request failed");
            RemoteError::Connectivity
        })?;

        let images = FeedItemsMapper::map_response(&response)?;
        debug!(url = %self.url, images = images.len(), "Loaded remote feed");
        Ok(images)
    }
}

#[async_trait]
impl FeedLoader for RemoteFeedLoader {
    async fn load(&self) -> FeedCacheResult<Vec<FeedImage>> {
        Ok(self.fetch().await?)
    }
}

impl std::fmt::Debug for RemoteFeedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFeedLoader")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpClientError, HttpResponse};
    use feedcache_core::FeedCacheError;
    use std::sync::Mutex;

    /// Client returning a canned result and recording requested URLs.
    struct StubClient {
        result: Result<HttpResponse, HttpClientError>,
        requested: Mutex<Vec<Url>>,
    }

    impl StubClient {
        fn returning(result: Result<HttpResponse, HttpClientError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                requested: Mutex::new(Vec::new()),
            })
        }

        fn requested(&self) -> Vec<Url> {
            self.requested.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn get(&self, url: &Url) -> Result<HttpResponse, HttpClientError> {
            self.requested.lock().expect("lock").push(url.clone());
            self.result.clone()
        }
    }

    fn feed_url() -> Url {
        Url::parse("https://a-given-url.com/feed").expect("valid url")
    }

    #[tokio::test]
    async fn test_load_requests_configured_url_once() {
        let client = StubClient::returning(Ok(HttpResponse::new(200, br#"{"items":[]}"#.to_vec())));
        let loader = RemoteFeedLoader::new(feed_url(), client.clone());

        loader.load().await.expect("load should succeed");

        assert_eq!(client.requested(), vec![feed_url()]);
    }

    #[tokio::test]
    async fn test_client_error_is_connectivity() {
        let client = StubClient::returning(Err(HttpClientError {
            url: feed_url().to_string(),
            reason: "offline".to_string(),
        }));
        let loader = RemoteFeedLoader::new(feed_url(), client);

        assert_eq!(
            loader.load().await,
            Err(FeedCacheError::Remote(RemoteError::Connectivity))
        );
    }

    #[tokio::test]
    async fn test_non_200_is_invalid_data() {
        let client = StubClient::returning(Ok(HttpResponse::new(500, br#"{"items":[]}"#.to_vec())));
        let loader = RemoteFeedLoader::new(feed_url(), client);

        assert_eq!(loader.fetch().await, Err(RemoteError::InvalidData));
    }

    #[tokio::test]
    async fn test_delivers_mapped_items() {
        let id = uuid::Uuid::new_v4();
        let body = format!(
            r#"{{"items":[{{"image_id":"{}","image_desc":"a description","image_url":"http://a-url.com/"}}]}}"#,
            id
        );
        let client = StubClient::returning(Ok(HttpResponse::new(200, body.into_bytes())));
        let loader = RemoteFeedLoader::new(feed_url(), client);

        let images = loader.fetch().await.expect("fetch should succeed");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id, id);
        assert_eq!(images[0].description.as_deref(), Some("a description"));
        assert_eq!(images[0].location, None);
    }
}
