//! Graph API access and image retrieval

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub mod graph_api;
pub mod http;
pub mod pagination;
pub mod shared_resources;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Network-level failure (timeout, connection refused, DNS)
    #[error("network error: {0}")]
    NetworkError(String),

    /// HTTP error response
    #[error("HTTP error {status}: {message}")]
    HttpError {
        /// Response status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Remote service signalled a rate limit (429)
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Response body failed to parse
    #[error("parse error: {0}")]
    ParseError(String),

    /// Response was structurally valid but missing required fields
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not even be constructed
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl FetcherError {
    /// Whether the error class is worth retrying.
    ///
    /// Network errors, 5xx and rate-limit responses are transient; other 4xx
    /// and malformed requests will fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetcherError::NetworkError(_) | FetcherError::RateLimitExceeded => true,
            FetcherError::HttpError { status, .. } => *status >= 500,
            FetcherError::ParseError(_)
            | FetcherError::InvalidResponse(_)
            | FetcherError::MalformedRequest(_) => false,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Final disposition of a fetch after all retries.
#[derive(Debug)]
pub enum FetchDisposition {
    /// Bytes retrieved successfully
    Success(Bytes),
    /// Attempts exhausted on a transient error
    Retryable(FetcherError),
    /// Aborted on a permanent error without retrying further
    Terminal(FetcherError),
}

/// Outcome of fetching one image, with attempt accounting.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Image identifier the fetch was for
    pub image_id: String,
    /// Final disposition
    pub disposition: FetchDisposition,
    /// Number of attempts made (1-based)
    pub attempts: u32,
    /// Wall time spent across all attempts, including backoff
    pub elapsed: Duration,
}

impl FetchOutcome {
    /// Whether the fetch ultimately succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.disposition, FetchDisposition::Success(_))
    }
}

/// Retrieves raw image bytes for a descriptor's signed URL.
///
/// The orchestrator depends on this seam rather than on the HTTP client
/// directly, so batch behavior is testable without a network.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the image bytes behind `url`, reporting the full outcome.
    async fn fetch_image(&self, image_id: &str, url: &str) -> FetchOutcome;
}
