//! Feedcache Remote - HTTP Feed Loader
//!
//! The network side of the feed: an HTTP client seam, the wire mapper, the
//! remote [`FeedLoader`](feedcache_core::FeedLoader) and the composition that
//! saves every successful remote load into the local cache.
//!
//! - [`HttpClient`]: one `get` returning status and body
//! - [`ReqwestHttpClient`]: the production client
//! - [`FeedItemsMapper`]: wire payload to feed images
//! - [`RemoteFeedLoader`]: client plus mapper behind `FeedLoader`
//! - [`CachingFeedLoader`]: remote load, then cache save

pub mod caching;
pub mod http;
pub mod mapper;
pub mod remote_loader;

pub use caching::CachingFeedLoader;
pub use http::{HttpClient, HttpClientError, HttpResponse, ReqwestHttpClient};
pub use mapper::FeedItemsMapper;
pub use remote_loader::RemoteFeedLoader;
