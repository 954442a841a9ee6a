//! Backend throttling state and backoff computation

use crate::search::config::RateLimitConfig;
use crate::search::metrics::SEARCH_METRICS;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Snapshot of the limiter's counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// Throttles since the last successful call
    pub consecutive_failures: u32,
    /// Wait applied before the next call
    pub current_backoff: Duration,
    /// Throttles seen over the limiter's lifetime
    pub throttled_total: u64,
    /// Successful calls that reset the backoff
    pub resets_total: u64,
}

/// Exponential backoff driven by backend throttling signals.
///
/// The n-th consecutive throttle waits `base * 2^(n-1)`, clamped to `max`.
/// Any successful call returns to the zero-wait baseline.
#[derive(Debug)]
pub struct RateLimiter {
    base_backoff: Duration,
    max_backoff: Duration,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    pub fn new(base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            base_backoff,
            max_backoff: max_backoff.max(base_backoff),
            state: Mutex::new(RateLimitState::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Sleep for the current backoff before issuing a call
    pub async fn wait(&self) {
        let delay = self.retry_after();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Backing off before backend call");
            tokio::time::sleep(delay).await;
        }
    }

    /// Record a throttling signal and grow the backoff
    pub fn handle_throttled(&self) -> Duration {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.throttled_total += 1;

        let exponent = state.consecutive_failures.saturating_sub(1).min(31);
        let backoff = self
            .base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);
        state.current_backoff = backoff;
        SEARCH_METRICS.throttled_total.inc();

        warn!(
            consecutive_failures = state.consecutive_failures,
            backoff_ms = backoff.as_millis() as u64,
            "Backend throttled request"
        );
        backoff
    }

    /// Return to the baseline after a successful call
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.consecutive_failures > 0 {
            info!(
                after_failures = state.consecutive_failures,
                "Backend accepted request, clearing backoff"
            );
        }
        state.consecutive_failures = 0;
        state.current_backoff = Duration::ZERO;
        state.resets_total += 1;
    }

    /// Wait the next call will observe
    pub fn retry_after(&self) -> Duration {
        self.state.lock().current_backoff
    }

    pub fn stats(&self) -> RateLimitState {
        self.state.lock().clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_is_bounded() {
        let limiter = RateLimiter::new(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(limiter.retry_after(), Duration::ZERO);

        assert_eq!(limiter.handle_throttled(), Duration::from_millis(100));
        assert_eq!(limiter.handle_throttled(), Duration::from_millis(200));
        assert_eq!(limiter.handle_throttled(), Duration::from_millis(400));
        assert_eq!(limiter.handle_throttled(), Duration::from_millis(500));
        for _ in 0..100 {
            assert_eq!(limiter.handle_throttled(), Duration::from_millis(500));
        }
        assert_eq!(limiter.retry_after(), Duration::from_millis(500));
    }

    #[test]
    fn test_reset_returns_to_baseline() {
        let limiter = RateLimiter::new(Duration::from_millis(100), Duration::from_secs(1));
        limiter.handle_throttled();
        limiter.handle_throttled();
        limiter.reset();

        let stats = limiter.stats();
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.current_backoff, Duration::ZERO);
        assert_eq!(stats.throttled_total, 2);
        assert_eq!(stats.resets_total, 1);
        assert_eq!(limiter.handle_throttled(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_wait_without_backoff_returns_immediately() {
        let limiter = RateLimiter::new(Duration::from_secs(60), Duration::from_secs(60));
        tokio::time::timeout(Duration::from_millis(50), limiter.wait())
            .await
            .expect("baseline wait must not sleep");
    }
}
