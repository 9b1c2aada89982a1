//! Source fetching.
//!
//! The [`Fetcher`] trait knows nothing about images: it turns a URL into
//! bytes or a [`FetchError`]. [`HttpFetcher`] is the production
//! implementation on `reqwest`; it enforces the scheme allow-list, a
//! client-wide timeout, and a body size cap. There are no retries; the
//! caller decides.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use thiserror::Error;

use crate::config::FetchConfig;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid source URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} exceeded the {limit} byte size limit")]
    TooLarge { url: String, limit: u64 },
    #[error("request to {url} timed out")]
    Timeout { url: String },
}

/// Retrieves raw bytes from a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// HTTP(S) fetcher backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

/// Parse and check that `raw` is an absolute http(s) URL.
pub fn parse_source_url(raw: &str) -> Result<reqwest::Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = reqwest::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("scheme '{other}' is not allowed"))),
    }
}

fn request_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            source: err,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let parsed = parse_source_url(url)?;
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(too_large());
        }

        // Content-Length can be absent or wrong; enforce the cap while streaming.
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| request_error(url, e))? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(url, bytes = body.len(), "fetched source");
        Ok(body.freeze())
    }
}
