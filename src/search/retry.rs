//! Retry policy shared by every backend call

use crate::search::error::{SearchError, SearchResult};
use crate::search::metrics::SEARCH_METRICS;
use crate::search::rate_limit::RateLimiter;
use crate::search::status::{StatusEvent, StatusSink};
use std::future::Future;
use tracing::{debug, error};

/// How many times a call is attempted and which failures are retried
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    classify: fn(&SearchError) -> bool,
}

impl RetryPolicy {
    /// Retry throttling only, up to `max_attempts` attempts in total
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            classify: SearchError::is_retryable,
        }
    }

    /// Replace the retryable-error classifier
    pub fn with_classifier(mut self, classify: fn(&SearchError) -> bool) -> Self {
        self.classify = classify;
        self
    }

    pub fn is_retryable(&self, err: &SearchError) -> bool {
        (self.classify)(err)
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The limiter paces every attempt and is reset
    /// on success.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        limiter: &RateLimiter,
        status: &dyn StatusSink,
        mut call: F,
    ) -> SearchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SearchResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            limiter.wait().await;

            match call().await {
                Ok(value) => {
                    limiter.reset();
                    SEARCH_METRICS
                        .requests_total
                        .with_label_values(&[operation, "ok"])
                        .inc();
                    debug!(operation, attempt, "Backend call succeeded");
                    return Ok(value);
                }
                Err(e) if self.is_retryable(&e) => {
                    let retry_after = limiter.handle_throttled();
                    SEARCH_METRICS
                        .requests_total
                        .with_label_values(&[operation, "throttled"])
                        .inc();

                    if attempt >= self.max_attempts {
                        error!(
                            operation,
                            attempts = attempt,
                            error = %e,
                            "Backend call still throttled, giving up"
                        );
                        return Err(SearchError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    status.report(StatusEvent::Throttled {
                        operation: operation.to_string(),
                        attempt,
                        max_attempts: self.max_attempts,
                        retry_after,
                    });
                }
                Err(e) => {
                    SEARCH_METRICS
                        .requests_total
                        .with_label_values(&[operation, "error"])
                        .inc();
                    error!(operation, attempt, error = %e, "Backend call failed");
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}
