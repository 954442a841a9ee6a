//! Common test utilities
//!
//! An in-memory [`SearchBackend`] that replays a script of responses, plus
//! helpers for reading Prometheus exposition output.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use search_lens::search::{
    HitsEnvelope, RawHit, SearchBackend, SearchConfig, SearchError, SearchResponse, SearchResult,
    TotalHits,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Backend replaying scripted responses in order.
///
/// `search` and `scroll` share one queue; an exhausted script answers with
/// a transport error.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<SearchResult<SearchResponse>>>,
    documents: Mutex<HashMap<String, RawHit>>,
    delay: Mutex<Duration>,
    pub search_calls: AtomicUsize,
    pub scroll_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
    clear_throttles: AtomicUsize,
    pub cleared: Mutex<Vec<String>>,
    pub bodies: Mutex<Vec<Value>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: SearchResult<SearchResponse>) -> &Self {
        self.script.lock().push_back(response);
        self
    }

    pub fn push_page(&self, first: usize, count: usize, total: u64, scroll_id: Option<&str>) -> &Self {
        self.push(Ok(page(first, count, total, scroll_id)))
    }

    pub fn push_throttle(&self) -> &Self {
        self.push(Err(SearchError::from_status(429, "Too Many Requests".to_string())))
    }

    /// Answer the next `clear_scroll` calls with 429
    pub fn throttle_clears(&self, times: usize) {
        self.clear_throttles.store(times, Ordering::SeqCst);
    }

    /// Sleep before answering each search or scroll call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn insert_document(&self, hit: RawHit) {
        self.documents.lock().insert(hit.id.clone(), hit);
    }

    pub fn calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst) + self.scroll_calls.load(Ordering::SeqCst)
    }

    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().clone()
    }

    async fn next(&self) -> SearchResult<SearchResponse> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SearchError::Transport("script exhausted".to_string())))
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    async fn search(
        &self,
        _index: &str,
        body: &Value,
        _scroll_ttl: Option<&str>,
    ) -> SearchResult<SearchResponse> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().push(body.clone());
        self.next().await
    }

    async fn scroll(&self, _scroll_id: &str, _ttl: &str) -> SearchResult<SearchResponse> {
        self.scroll_calls.fetch_add(1, Ordering::SeqCst);
        self.next().await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> SearchResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        let throttled = self
            .clear_throttles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(SearchError::from_status(429, "Too Many Requests".to_string()));
        }
        self.cleared.lock().push(scroll_id.to_string());
        Ok(())
    }

    async fn get(&self, _index: &str, id: &str) -> SearchResult<Option<RawHit>> {
        Ok(self.documents.lock().get(id).cloned())
    }
}

/// One log-like hit
pub fn hit(n: usize) -> RawHit {
    RawHit {
        id: format!("doc-{}", n),
        index: "logs-test".to_string(),
        doc_type: None,
        score: Some(1.0),
        version: None,
        source: json!({
            "timestamp": 1_700_000_000 + n as i64,
            "severity": (n % 5).to_string(),
            "message": format!("event number {}", n),
            "host": { "name": format!("web-{}", n % 3) }
        }),
    }
}

/// A response carrying `count` hits numbered from `first`
pub fn page(first: usize, count: usize, total: u64, scroll_id: Option<&str>) -> SearchResponse {
    SearchResponse {
        hits: HitsEnvelope {
            total: Some(TotalHits::Object {
                value: total,
                relation: Some("eq".to_string()),
            }),
            hits: (first..first + count).map(hit).collect(),
        },
        scroll_id: scroll_id.map(str::to_string),
    }
}

/// Configuration with millisecond backoff so retries stay fast
pub fn fast_config() -> SearchConfig {
    SearchConfig::builder()
        .backoff_ms(1, 5)
        .max_attempts(5)
        .fetch_timeout_secs(10)
        .build()
        .expect("valid test configuration")
}

/// Helper function to parse Prometheus exposition format
/// Returns a map of metric lines for easy assertion
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}

/// Extract metric value from a Prometheus output line
/// Example: `metric_name{label1="value1"} 42.5` -> Some(42.5)
pub fn extract_metric_value(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse::<f64>().ok()
}
