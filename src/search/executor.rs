//! Query execution with bounded and cursor retrieval

use crate::search::backend::{SearchBackend, SearchResponse};
use crate::search::config::SearchConfig;
use crate::search::document::DocumentEntry;
use crate::search::error::{SearchError, SearchResult};
use crate::search::metrics::SEARCH_METRICS;
use crate::search::query::CompositeQuery;
use crate::search::rate_limit::RateLimiter;
use crate::search::retry::RetryPolicy;
use crate::search::status::{StatusEvent, StatusSink, TracingStatusSink};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a fetch retrieved its documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FetchMode {
    /// One request capped at the expected size
    Bounded,
    /// Scroll cursor walked batch by batch
    Cursor,
}

/// Documents returned by one fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub entries: Vec<DocumentEntry>,

    /// Backend-reported total in bounded mode; documents retrieved in cursor mode
    pub total_hits: u64,

    /// `hits.total` as reported by the first response, if any
    pub reported_total: Option<u64>,

    pub mode: FetchMode,
}

/// Executes composite queries against a [`SearchBackend`].
///
/// Every backend call goes through the same [`RetryPolicy`], paced by a
/// shared [`RateLimiter`]. Requests larger than the cursor threshold walk a
/// scroll cursor, which is released on every exit path.
pub struct SearchExecutor {
    backend: Arc<dyn SearchBackend>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    config: SearchConfig,
    status: Arc<dyn StatusSink>,
}

impl SearchExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>, config: SearchConfig) -> Self {
        Self {
            backend,
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            policy: RetryPolicy::new(config.max_attempts),
            config,
            status: Arc::new(TracingStatusSink),
        }
    }

    pub fn with_status_sink(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Choose the retrieval mode for a requested size
    pub fn mode_for(&self, expected_size: usize) -> FetchMode {
        if expected_size > self.config.cursor_threshold {
            FetchMode::Cursor
        } else {
            FetchMode::Bounded
        }
    }

    /// Run `query` against `index`, bounded by the configured fetch timeout.
    ///
    /// A failed fetch never returns partial results.
    pub async fn fetch(
        &self,
        query: &CompositeQuery,
        index: &str,
        expected_size: usize,
    ) -> SearchResult<FetchResult> {
        let mode = self.mode_for(expected_size);
        let deadline = self.config.fetch_timeout();
        let started = Instant::now();

        self.status.report(StatusEvent::FetchStarted {
            index: index.to_string(),
            expected_size,
            cursor: mode == FetchMode::Cursor,
        });
        info!(
            index,
            expected_size,
            %mode,
            clauses = query.clause_count(),
            "Starting fetch"
        );

        let mut guard = ScrollGuard::new(Arc::clone(&self.backend));
        let work = async {
            match mode {
                FetchMode::Bounded => self.fetch_bounded(query, index, expected_size).await,
                FetchMode::Cursor => self.fetch_with_cursor(query, index, &mut guard).await,
            }
        };

        let outcome = match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(deadline)),
        };

        // Outside the deadline: release retries must not turn a finished walk
        // into a timeout.
        if let Some(scroll_id) = guard.scroll_id().map(str::to_string) {
            self.release_cursor(&scroll_id).await;
            guard.disarm();
        }

        let mode_label = mode.to_string();
        SEARCH_METRICS
            .fetch_duration
            .with_label_values(&[mode_label.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => {
                SEARCH_METRICS
                    .documents_fetched
                    .with_label_values(&[mode_label.as_str()])
                    .inc_by(result.entries.len() as f64);
                self.status.report(StatusEvent::FetchCompleted {
                    retrieved: result.entries.len(),
                    total_hits: result.total_hits,
                });
                Ok(result)
            }
            Err(e) => {
                self.status.report(StatusEvent::FetchFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Fetch a single document by id
    pub async fn fetch_document(&self, index: &str, id: &str) -> SearchResult<Option<DocumentEntry>> {
        let backend = &self.backend;
        let hit = self
            .policy
            .run("get", &self.limiter, self.status.as_ref(), move || backend.get(index, id))
            .await?;
        Ok(hit.map(DocumentEntry::from))
    }

    async fn fetch_bounded(
        &self,
        query: &CompositeQuery,
        index: &str,
        expected_size: usize,
    ) -> SearchResult<FetchResult> {
        let body = query.clone().with_size(expected_size).to_body();
        let response = self.search(index, &body, None).await?;

        let reported_total = response.total_hits();
        let entries: Vec<DocumentEntry> = response
            .hits
            .hits
            .into_iter()
            .map(DocumentEntry::from)
            .collect();

        debug!(index, retrieved = entries.len(), ?reported_total, "Bounded fetch complete");
        Ok(FetchResult {
            total_hits: reported_total.unwrap_or(entries.len() as u64),
            reported_total,
            entries,
            mode: FetchMode::Bounded,
        })
    }

    /// Walk the cursor to exhaustion. The caller releases whatever cursor
    /// `guard` still holds.
    async fn fetch_with_cursor(
        &self,
        query: &CompositeQuery,
        index: &str,
        guard: &mut ScrollGuard,
    ) -> SearchResult<FetchResult> {
        let body = query.clone().with_size(self.config.batch_size).to_body();
        let (entries, reported_total) = self.walk_cursor(index, &body, guard).await?;
        Ok(FetchResult {
            total_hits: entries.len() as u64,
            reported_total,
            entries,
            mode: FetchMode::Cursor,
        })
    }

    async fn walk_cursor(
        &self,
        index: &str,
        body: &serde_json::Value,
        guard: &mut ScrollGuard,
    ) -> SearchResult<(Vec<DocumentEntry>, Option<u64>)> {
        let ttl = self.config.scroll_ttl.as_str();
        let mut response = self.search(index, body, Some(ttl)).await?;
        let reported_total = response.total_hits();

        let mut entries = Vec::new();
        let mut batch = 0;
        loop {
            if let Some(id) = response.scroll_id.take() {
                guard.arm(id);
            }
            if response.hits.hits.is_empty() {
                break;
            }

            batch += 1;
            entries.extend(response.hits.hits.into_iter().map(DocumentEntry::from));
            self.status.report(StatusEvent::BatchReceived {
                batch,
                retrieved: entries.len(),
            });

            let scroll_id = guard
                .scroll_id()
                .ok_or_else(|| SearchError::Decode("cursor response carried no _scroll_id".to_string()))?
                .to_string();
            response = self.scroll(&scroll_id, ttl).await?;
        }

        debug!(index, batches = batch, retrieved = entries.len(), "Cursor exhausted");
        Ok((entries, reported_total))
    }

    async fn search(
        &self,
        index: &str,
        body: &serde_json::Value,
        scroll_ttl: Option<&str>,
    ) -> SearchResult<SearchResponse> {
        let backend = &self.backend;
        self.policy
            .run("search", &self.limiter, self.status.as_ref(), move || {
                backend.search(index, body, scroll_ttl)
            })
            .await
    }

    async fn scroll(&self, scroll_id: &str, ttl: &str) -> SearchResult<SearchResponse> {
        let backend = &self.backend;
        self.policy
            .run("scroll", &self.limiter, self.status.as_ref(), move || {
                backend.scroll(scroll_id, ttl)
            })
            .await
    }

    async fn release_cursor(&self, scroll_id: &str) {
        let backend = &self.backend;
        let released = self
            .policy
            .run("clear_scroll", &self.limiter, self.status.as_ref(), move || {
                backend.clear_scroll(scroll_id)
            })
            .await;
        if let Err(e) = released {
            warn!(error = %e, "Failed to release scroll cursor, leaving it to expire");
        }
    }
}

/// Holds the current cursor id until it is released. Dropping an armed
/// guard, when the whole fetch is cancelled, releases it on a spawned task.
struct ScrollGuard {
    backend: Arc<dyn SearchBackend>,
    scroll_id: Option<String>,
}

impl ScrollGuard {
    fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            scroll_id: None,
        }
    }

    fn arm(&mut self, scroll_id: String) {
        self.scroll_id = Some(scroll_id);
    }

    fn scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }

    fn disarm(&mut self) {
        self.scroll_id = None;
    }
}

impl Drop for ScrollGuard {
    fn drop(&mut self) {
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let backend = Arc::clone(&self.backend);
                handle.spawn(async move {
                    if let Err(e) = backend.clear_scroll(&scroll_id).await {
                        warn!(error = %e, "Failed to release abandoned scroll cursor");
                    }
                });
            }
            Err(_) => warn!("No runtime available, abandoned scroll cursor left to expire"),
        }
    }
}
