//! Retrieval behaviour of the search executor against a scripted backend

mod common;

use common::{fast_config, hit, ScriptedBackend};
use prometheus::Registry;
use search_lens::search::{
    gather_metrics, init_search_metrics, ChannelStatusSink, CompositeQuery, FetchMode,
    SearchConfig, SearchError, SearchExecutor, StatusEvent,
};
use std::sync::Arc;
use std::time::Duration;

fn executor(backend: &Arc<ScriptedBackend>, config: SearchConfig) -> SearchExecutor {
    SearchExecutor::new(backend.clone(), config)
}

#[tokio::test]
async fn test_cursor_fetch_accumulates_batches_and_releases_once() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push_page(0, 1000, 2000, Some("scroll-1"))
        .push_page(1000, 1000, 2000, Some("scroll-1"))
        .push_page(2000, 0, 2000, Some("scroll-1"));

    let result = executor(&backend, fast_config())
        .fetch(&CompositeQuery::match_all(500), "logs-*", 15_000)
        .await
        .unwrap();

    assert_eq!(result.mode, FetchMode::Cursor);
    assert_eq!(result.entries.len(), 2000);
    assert_eq!(result.total_hits, 2000);
    assert_eq!(result.entries[1999].id(), "doc-1999");
    assert_eq!(backend.cleared(), vec!["scroll-1".to_string()]);
    assert_eq!(backend.bodies.lock()[0]["size"], 1000);
}

#[tokio::test]
async fn test_throttled_twice_then_succeeds() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.push_throttle().push_throttle().push_page(0, 10, 10, None);

    let (sink, mut events) = ChannelStatusSink::new();
    let exec = executor(&backend, fast_config()).with_status_sink(Arc::new(sink));
    let result = exec
        .fetch(&CompositeQuery::match_all(100), "logs-*", 100)
        .await
        .unwrap();

    assert_eq!(result.mode, FetchMode::Bounded);
    assert_eq!(result.entries.len(), 10);

    let stats = exec.rate_limiter().stats();
    assert_eq!(stats.throttled_total, 2);
    assert_eq!(stats.resets_total, 1);
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(backend.calls(), 3);
    assert!(backend.calls() <= exec.config().max_attempts as usize);

    let mut throttle_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, StatusEvent::Throttled { .. }) {
            throttle_events += 1;
        }
    }
    assert_eq!(throttle_events, 2);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let backend = Arc::new(ScriptedBackend::new());
    for _ in 0..10 {
        backend.push_throttle();
    }

    let config = SearchConfig::builder()
        .backoff_ms(1, 2)
        .max_attempts(3)
        .build()
        .unwrap();
    let err = executor(&backend, config)
        .fetch(&CompositeQuery::match_all(100), "logs-*", 100)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_throttle_mid_cursor_is_retried() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push_page(0, 1000, 1500, Some("s"))
        .push_throttle()
        .push_page(1000, 500, 1500, Some("s"))
        .push_page(1500, 0, 1500, Some("s"));

    let result = executor(&backend, fast_config())
        .fetch(&CompositeQuery::match_all(100), "logs-*", 20_000)
        .await
        .unwrap();

    assert_eq!(result.entries.len(), 1500);
    assert_eq!(backend.scroll_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(backend.cleared().len(), 1);
}

#[tokio::test]
async fn test_cursor_error_discards_partial_results_and_releases() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.push_page(0, 1000, 5000, Some("s-err")).push(Err(SearchError::Decode(
        "unexpected end of input".to_string(),
    )));

    let err = executor(&backend, fast_config())
        .fetch(&CompositeQuery::match_all(100), "logs-*", 50_000)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::Decode(_)));
    assert_eq!(backend.cleared(), vec!["s-err".to_string()]);
}

#[tokio::test]
async fn test_timeout_releases_cursor() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.set_delay(Duration::from_millis(700));
    backend
        .push_page(0, 1000, 5000, Some("s-slow"))
        .push_page(1000, 1000, 5000, Some("s-slow"));

    let config = SearchConfig::builder()
        .backoff_ms(1, 2)
        .fetch_timeout_secs(1)
        .build()
        .unwrap();
    let err = executor(&backend, config)
        .fetch(&CompositeQuery::match_all(100), "logs-*", 50_000)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Timeout(_)));

    assert_eq!(backend.cleared(), vec!["s-slow".to_string()]);
}

#[tokio::test]
async fn test_throttled_release_outlives_fetch_deadline() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push_page(0, 1000, 1000, Some("cur"))
        .push_page(1000, 0, 1000, Some("cur"));
    backend.throttle_clears(1);

    let config = SearchConfig::builder()
        .backoff_ms(1500, 1500)
        .fetch_timeout_secs(1)
        .build()
        .unwrap();
    let result = executor(&backend, config)
        .fetch(&CompositeQuery::match_all(100), "logs-*", 50_000)
        .await
        .unwrap();

    assert_eq!(result.mode, FetchMode::Cursor);
    assert_eq!(result.entries.len(), 1000);
    assert_eq!(backend.clear_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(backend.cleared(), vec!["cur".to_string()]);
}

#[tokio::test]
async fn test_fetch_document() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.insert_document(hit(7));
    let exec = executor(&backend, fast_config());

    let entry = exec.fetch_document("logs-test", "doc-7").await.unwrap().unwrap();
    assert_eq!(entry.formatted("message"), "event number 7");
    assert_eq!(entry.formatted("timestamp"), "2023-11-14T22:13:27Z");
    assert!(exec.fetch_document("logs-test", "doc-8").await.unwrap().is_none());
}

#[tokio::test]
async fn test_metrics_exported() {
    let registry = Registry::new();
    init_search_metrics(&registry).unwrap();

    let backend = Arc::new(ScriptedBackend::new());
    backend.push_page(0, 3, 3, None);
    executor(&backend, fast_config())
        .fetch(&CompositeQuery::match_all(10), "logs-*", 10)
        .await
        .unwrap();

    let output = gather_metrics(&registry);
    let metrics = common::parse_prometheus_output(&output);
    let fetched = metrics
        .get("search_lens_search_documents_fetched_total")
        .expect("documents counter exported");
    let bounded = fetched
        .iter()
        .find(|line| line.contains("mode=\"bounded\""))
        .and_then(|line| common::extract_metric_value(line))
        .unwrap();
    assert!(bounded >= 3.0);
    assert!(metrics.contains_key("search_lens_search_fetch_duration_seconds"));
}
