//! HTTP fetch client with bounded retry and shared rate limiting
//!
//! One client serves both request shapes the downloader needs: authenticated
//! JSON requests against the Graph API and unauthenticated byte retrievals
//! from short-lived signed image URLs.
//!
//! Retry policy per attempt: network errors, 5xx and 429 back off
//! exponentially (with jitter) and retry up to the configured ceiling; any
//! other 4xx aborts immediately. A 429 additionally raises the shared
//! rate-limiter penalty so subsequent unrelated fetches slow down too -
//! that, not per-request backoff, is what keeps the whole batch inside the
//! service's allowed rate.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::downloader::config::{backoff_with_jitter, MAX_RETRIES};
use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::shared_resources::{global_http_client, global_rate_limiter};
use crate::fetcher::{
    FetchDisposition, FetchOutcome, FetcherError, FetcherResult, ImageFetcher,
};
use crate::shutdown::SharedShutdown;
use serde::de::DeserializeOwned;

/// HTTP client wrapper with authentication, retry and rate limiting.
pub struct FetchClient {
    client: Arc<Client>,
    access_token: String,
    rate_limiter: Arc<RateLimiter>,
    max_retries: u32,
    shutdown: Option<SharedShutdown>,
}

impl FetchClient {
    /// Create a client using the global HTTP client and rate limiter.
    pub fn new(access_token: String) -> Self {
        Self {
            client: global_http_client(),
            access_token,
            rate_limiter: global_rate_limiter(),
            max_retries: MAX_RETRIES,
            shutdown: crate::shutdown::get_global_shutdown(),
        }
    }

    /// Override the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attach a shared shutdown handle; backoff sleeps abort when it fires.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Substitute a dedicated rate limiter (tests, custom budgets).
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// The rate limiter this client consults.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    /// Execute an authenticated GET returning deserialized JSON.
    pub async fn get_json<T>(&self, url: &str, params: &[(&str, String)]) -> FetcherResult<T>
    where
        T: DeserializeOwned,
    {
        let (response, _attempts) = self
            .request_with_retry(url, params, true)
            .await
            .map_err(|(error, _attempts)| error)?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetcherError::ParseError(format!("Failed to deserialize response: {e}")))
    }

    /// Retrieve raw bytes from an unauthenticated (signed) URL, reporting how
    /// many attempts the retrieval took.
    async fn get_bytes(&self, url: &str) -> (FetcherResult<Bytes>, u32) {
        match self.request_with_retry(url, &[], false).await {
            Ok((response, attempts)) => {
                let bytes = response.bytes().await.map_err(|e| {
                    FetcherError::NetworkError(format!("Failed to read body: {e}"))
                });
                (bytes, attempts)
            }
            Err((error, attempts)) => (Err(error), attempts),
        }
    }

    /// Retry loop shared by both request shapes.
    ///
    /// Returns the successful response, or the last error once either a
    /// terminal failure occurs or the attempt ceiling is reached. Both arms
    /// carry the number of attempts actually made.
    async fn request_with_retry(
        &self,
        url: &str,
        params: &[(&str, String)],
        authenticated: bool,
    ) -> Result<(Response, u32), (FetcherError, u32)> {
        let mut last_error = None;
        let mut attempts = 0;

        for attempt in 0..=self.max_retries {
            attempts = attempt + 1;
            // Consult the shared limiter before every attempt; this is also
            // where the cross-request penalty delay is served.
            self.rate_limiter.acquire().await.map_err(|e| {
                (
                    FetcherError::NetworkError(format!("Rate limiter error: {e}")),
                    attempts,
                )
            })?;

            let mut request = self.client.get(url).query(params);
            if authenticated {
                request = request.header("Authorization", format!("OAuth {}", self.access_token));
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_builder() => {
                    // Malformed URL; identical on every attempt.
                    return Err((FetcherError::MalformedRequest(e.to_string()), attempts));
                }
                Err(e) => {
                    let error = FetcherError::NetworkError(e.to_string());
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        error = %error,
                        "Network error"
                    );
                    last_error = Some(error);
                    if attempt < self.max_retries && self.wait_before_retry(attempt).await {
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                // Slow the whole batch down, not just this request.
                self.rate_limiter.penalize();
                warn!(
                    attempt = attempt + 1,
                    max_attempts = self.max_retries + 1,
                    penalty_ms = self.rate_limiter.current_penalty().as_millis() as u64,
                    "Rate limit response (429); raising shared penalty"
                );
                last_error = Some(FetcherError::RateLimitExceeded);
                if attempt < self.max_retries && self.wait_before_retry(attempt).await {
                    continue;
                }
                break;
            }

            if status.is_server_error() {
                warn!(
                    attempt = attempt + 1,
                    max_attempts = self.max_retries + 1,
                    status = status.as_u16(),
                    "Server error"
                );
                last_error = Some(FetcherError::HttpError {
                    status: status.as_u16(),
                    message: status.to_string(),
                });
                if attempt < self.max_retries && self.wait_before_retry(attempt).await {
                    continue;
                }
                break;
            }

            if status.is_client_error() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err((
                    FetcherError::HttpError {
                        status: status.as_u16(),
                        message,
                    },
                    attempts,
                ));
            }

            debug!(attempt = attempt + 1, "Request succeeded");
            self.rate_limiter.record_success();
            return Ok((response, attempts));
        }

        Err((
            last_error
                .unwrap_or_else(|| FetcherError::NetworkError("All retries exhausted".to_string())),
            attempts,
        ))
    }

    /// Sleep for the backoff interval, racing the shutdown signal.
    ///
    /// Returns false when shutdown fired, which ends the retry loop so the
    /// in-flight fetch aborts within one backoff interval.
    async fn wait_before_retry(&self, attempt: u32) -> bool {
        let backoff = backoff_with_jitter(attempt);
        debug!(backoff_ms = backoff.as_millis() as u64, "Retrying after backoff");
        match &self.shutdown {
            Some(shutdown) => {
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => true,
                    _ = shutdown.wait_for_shutdown() => false,
                }
            }
            None => {
                tokio::time::sleep(backoff).await;
                true
            }
        }
    }
}

#[async_trait]
impl ImageFetcher for FetchClient {
    async fn fetch_image(&self, image_id: &str, url: &str) -> FetchOutcome {
        let started = Instant::now();
        let (result, attempts) = self.get_bytes(url).await;
        let elapsed = started.elapsed();

        let disposition = match result {
            Ok(bytes) => FetchDisposition::Success(bytes),
            Err(e) if e.is_retryable() => FetchDisposition::Retryable(e),
            Err(e) => FetchDisposition::Terminal(e),
        };

        FetchOutcome {
            image_id: image_id.to_string(),
            disposition,
            attempts,
            elapsed,
        }
    }
}
