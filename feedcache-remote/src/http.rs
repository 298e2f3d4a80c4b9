//! HTTP client seam.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// Status and body of a completed HTTP exchange.
///
/// Any status counts as a completed exchange; interpreting it is the
/// mapper's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The request never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("HTTP request to {url} failed: {reason}")]
pub struct HttpClientError {
    pub url: String,
    pub reason: String,
}

/// Minimal HTTP capability needed by the remote loader.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` and return whatever the server answered.
    async fn get(&self, url: &Url) -> Result<HttpResponse, HttpClientError>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a preconfigured `reqwest` client (timeouts, proxies, ...).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse, HttpClientError> {
        let failed = |e: reqwest::Error| HttpClientError {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url.clone()).send().await.map_err(failed)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(failed)?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_client_error() {
        let client = ReqwestHttpClient::new();
        let url = Url::parse("http://127.0.0.1:1/feed").expect("valid url");

        let err = client.get(&url).await.expect_err("port 1 should refuse");
        assert_eq!(err.url, "http://127.0.0.1:1/feed");
    }

    #[test]
    fn test_response_body_conversion() {
        let response = HttpResponse::new(200, "{}");
        assert_eq!(response.body, b"{}".to_vec());
    }
}
