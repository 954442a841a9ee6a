//! Prometheus metrics for search execution.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder};

/// Container for all search metrics
pub struct SearchMetrics {
    /// Backend calls by operation and outcome
    pub requests_total: CounterVec,

    /// Throttling signals received from the backend
    pub throttled_total: IntCounter,

    /// Documents delivered to callers
    pub documents_fetched: CounterVec,

    /// Duration of complete fetches
    pub fetch_duration: HistogramVec,
}

impl SearchMetrics {
    fn new() -> Self {
        Self {
            requests_total: CounterVec::new(
                Opts::new("search_requests_total", "Total number of backend search calls")
                    .namespace("search_lens"),
                &["operation", "outcome"],
            )
            .expect("Failed to create search_requests_total metric"),

            throttled_total: IntCounter::with_opts(
                Opts::new("search_throttled_total", "Total number of throttled backend calls")
                    .namespace("search_lens"),
            )
            .expect("Failed to create search_throttled_total metric"),

            documents_fetched: CounterVec::new(
                Opts::new("search_documents_fetched_total", "Total number of documents fetched")
                    .namespace("search_lens"),
                &["mode"],
            )
            .expect("Failed to create search_documents_fetched_total metric"),

            fetch_duration: HistogramVec::new(
                HistogramOpts::new("search_fetch_duration_seconds", "Duration of complete fetches")
                    .namespace("search_lens")
                    .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
                &["mode"],
            )
            .expect("Failed to create search_fetch_duration_seconds metric"),
        }
    }
}

lazy_static! {
    /// Global search metrics instance
    pub static ref SEARCH_METRICS: SearchMetrics = SearchMetrics::new();
}

/// Register search metrics with a Prometheus registry
pub fn init_search_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(SEARCH_METRICS.requests_total.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.throttled_total.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.documents_fetched.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.fetch_duration.clone()))?;
    Ok(())
}

/// Export a registry in Prometheus text format
pub fn gather_metrics(registry: &Registry) -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_export() {
        let registry = Registry::new();
        init_search_metrics(&registry).unwrap();

        SEARCH_METRICS
            .requests_total
            .with_label_values(&["search", "ok"])
            .inc();
        SEARCH_METRICS.throttled_total.inc();

        let text = gather_metrics(&registry);
        assert!(text.contains("search_lens_search_requests_total"));
        assert!(text.contains("search_lens_search_throttled_total"));
    }
}
