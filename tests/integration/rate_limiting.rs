//! Shared rate-limit penalty behavior

use mapillary_sequence_downloader::downloader::RateLimiter;
use std::time::Duration;

#[test]
fn rate_limit_signal_raises_delay_for_subsequent_fetches() {
    let limiter = RateLimiter::new(100, Duration::from_secs(60));
    assert_eq!(limiter.current_penalty(), Duration::ZERO);

    limiter.penalize();
    let after_one = limiter.current_penalty();
    assert!(after_one > Duration::ZERO);

    // Every fetch unit holds a clone of the same limiter; the raised delay
    // must be visible to all of them.
    let other_unit = limiter.clone();
    assert_eq!(other_unit.current_penalty(), after_one);

    limiter.penalize();
    assert!(limiter.current_penalty() >= after_one, "monotonic under signals");
}

#[test]
fn successes_inside_the_cooldown_do_not_lower_the_penalty() {
    let limiter = RateLimiter::new(100, Duration::from_secs(60));
    limiter.penalize();
    let raised = limiter.current_penalty();

    for _ in 0..20 {
        limiter.record_success();
    }
    assert_eq!(
        limiter.current_penalty(),
        raised,
        "penalty decays only after a quiet cooldown"
    );
}

#[tokio::test]
async fn acquire_serves_the_penalty_delay() {
    let limiter = RateLimiter::new(100, Duration::from_secs(60));
    limiter.penalize();
    let penalty = limiter.current_penalty();

    let started = std::time::Instant::now();
    limiter.acquire().await.unwrap();
    assert!(
        started.elapsed() >= penalty,
        "acquire must serve at least the shared penalty"
    );
}
