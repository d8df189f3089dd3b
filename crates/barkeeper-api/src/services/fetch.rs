//! Remote file fetching for JSON `urls` payloads.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Upstream bodies kept for diagnostics are cut to this many characters.
const MAX_DIAGNOSTIC_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Upstream responded with status {status}")]
    Status { status: u16, body: Option<String> },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Request(_) => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            FetchError::Status { body, .. } => body.as_deref(),
            FetchError::Request(_) => None,
        }
    }
}

/// Downloads the bytes behind a URL.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// `reqwest`-backed fetcher with a per-request timeout.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetcher for ReqwestFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .ok()
                .filter(|b| !b.is_empty())
                .map(|b| b.chars().take(MAX_DIAGNOSTIC_BODY_CHARS).collect());
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))
    }
}
