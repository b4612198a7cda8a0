//! Shared rate limiting with a cross-request penalty delay
//!
//! Two mechanisms cooperate, both shared by every concurrent fetch unit:
//!
//! 1. A semaphore-backed request window bounds the aggregate request rate.
//! 2. A penalty delay, raised whenever the remote service signals a rate
//!    limit, slows down *subsequent unrelated* requests too. The penalty is
//!    monotonically non-decreasing while signals keep arriving and only
//!    decays after a quiet cooldown period, so the batch as a whole settles
//!    under the service's allowed rate instead of each request backing off
//!    alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Penalty added per rate-limit signal, milliseconds.
const PENALTY_STEP_MS: u64 = 500;

/// Ceiling for the shared penalty delay, milliseconds.
const PENALTY_CAP_MS: u64 = 30_000;

/// Quiet period after which successful requests may shrink the penalty.
const PENALTY_COOLDOWN: Duration = Duration::from_secs(60);

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire a request permit
    #[error("failed to acquire rate limit permit: {0}")]
    AcquireError(String),
}

/// Shared request-rate governor.
///
/// Clone-cheap via internal `Arc`s; every fetch unit of a run must hold the
/// same instance so the window and the penalty state are truly global.
#[derive(Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    window: Duration,
    penalty_ms: Arc<AtomicU64>,
    last_signal: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_requests)),
            window,
            penalty_ms: Arc::new(AtomicU64::new(0)),
            last_signal: Arc::new(Mutex::new(None)),
        }
    }

    /// Acquire a permit for one request, then serve the shared penalty delay.
    ///
    /// The permit is held for a full window after acquisition, so at most
    /// `max_requests` requests start within any window.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        // Hold the permit for the window duration, then release.
        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });

        let penalty = self.current_penalty();
        if !penalty.is_zero() {
            sleep(penalty).await;
        }

        Ok(())
    }

    /// Record a rate-limit signal from the remote service.
    ///
    /// Raises the shared delay applied to all subsequent requests. Never
    /// decreases it; within the cooldown the penalty only moves up.
    pub fn penalize(&self) {
        let current = self.penalty_ms.load(Ordering::Acquire);
        let raised = current
            .saturating_add(PENALTY_STEP_MS.max(current / 2))
            .min(PENALTY_CAP_MS);
        self.penalty_ms.fetch_max(raised, Ordering::AcqRel);

        let mut last = self.last_signal.lock().expect("penalty lock poisoned");
        *last = Some(Instant::now());
    }

    /// Record a successful request.
    ///
    /// Once no rate-limit signal has arrived for a full cooldown, the penalty
    /// is halved per success until it reaches zero.
    pub fn record_success(&self) {
        let cooled_down = {
            let last = self.last_signal.lock().expect("penalty lock poisoned");
            match *last {
                Some(at) => at.elapsed() >= PENALTY_COOLDOWN,
                None => return,
            }
        };

        if cooled_down {
            let current = self.penalty_ms.load(Ordering::Acquire);
            if current > 0 {
                let _ = self.penalty_ms.compare_exchange(
                    current,
                    current / 2,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        }
    }

    /// The delay currently applied before each request.
    pub fn current_penalty(&self) -> Duration {
        Duration::from_millis(self.penalty_ms.load(Ordering::Acquire))
    }
}
