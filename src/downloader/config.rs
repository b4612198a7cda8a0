//! Download configuration constants

use rand::Rng;
use std::time::Duration;

/// Maximum number of retries for failed requests.
/// 5 retries with exponential backoff recovers from transient network issues
/// while bounding the worst-case wait on persistent failures (~1 minute).
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds.
/// 1 second gives short rate-limit windows time to reset without stalling
/// recovery from one-off network hiccups.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay in milliseconds.
/// 30 seconds caps the exponential curve (retry 5 = 32s capped to 30s).
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Fraction of the base delay added as random jitter.
/// Keeps concurrent fetch units from retrying in lockstep after a shared
/// rate-limit response.
pub const JITTER_FRACTION: f64 = 0.25;

/// Default number of images fetched concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Hard ceiling on concurrency; above this the downloader would mostly
/// rate-limit itself.
pub const MAX_CONCURRENCY: usize = 16;

/// Default request budget per window for the shared rate limiter.
/// 500 requests/minute stays comfortably inside the Graph API allowance
/// while keeping a 4-way concurrent batch busy.
pub const DEFAULT_REQUESTS_PER_WINDOW: usize = 500;

/// Window for the shared rate limiter.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Calculate the deterministic exponential backoff delay for a retry.
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

/// Backoff delay with random jitter added on top of the exponential base.
pub fn backoff_with_jitter(retry_count: u32) -> Duration {
    let base = calculate_backoff(retry_count);
    let jitter_ceiling = (base.as_millis() as f64 * JITTER_FRACTION) as u64;
    let jitter = if jitter_ceiling == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ceiling)
    };
    base + Duration::from_millis(jitter)
}
