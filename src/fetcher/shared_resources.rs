//! Shared resources for all fetch operations
//!
//! Provides the process-wide HTTP client and rate limiter. The Graph API
//! enforces request quotas per access token; if each fetch unit carried its
//! own limiter, concurrent downloads would bypass the shared budget. Every
//! fetch path therefore goes through these singletons.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::downloader::config::{DEFAULT_REQUESTS_PER_WINDOW, RATE_WINDOW};
use crate::downloader::rate_limit::RateLimiter;

/// HTTP connect timeout (seconds) - time to establish the TCP connection.
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - full-resolution images can be large, so
/// this is generous compared to the JSON endpoints.
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Global HTTP client shared by every fetch operation.
///
/// reqwest clients clone cheaply, but a single instance keeps connection
/// pooling effective across the whole batch. Explicit timeouts prevent
/// indefinite hangs on dead connections.
pub static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build HTTP client: {e}. Check system TLS configuration.");
            }),
    )
});

/// Global rate limiter shared by every fetch operation.
pub static GLOBAL_RATE_LIMITER: Lazy<Arc<RateLimiter>> =
    Lazy::new(|| Arc::new(RateLimiter::new(DEFAULT_REQUESTS_PER_WINDOW, RATE_WINDOW)));

/// Get the global HTTP client (cheap Arc clone).
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}

/// Get the global rate limiter (cheap Arc clone).
pub fn global_rate_limiter() -> Arc<RateLimiter> {
    GLOBAL_RATE_LIMITER.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_client_is_shared() {
        let a = global_http_client();
        let b = global_http_client();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_global_rate_limiter_is_shared() {
        let a = global_rate_limiter();
        let b = global_rate_limiter();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
