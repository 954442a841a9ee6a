//! Filter compilation and resilient retrieval against a document-search backend
//!
//! This module turns user-typed filter expressions into Elasticsearch/OpenSearch
//! queries and executes them, including:
//!
//! - **Filter language**: `field=value`, ranges, `null` checks, `_id` lookups,
//!   escapable `*`/`?` wildcards and free-text fallback
//! - **Timeframes**: `today`, `week`, `2d`, `12h`, ... compiled to a time-range clause
//! - **Bounded and cursor retrieval**: one capped request, or a scroll cursor
//!   walked in batches and always released
//! - **Throttling**: exponential backoff and bounded retries shared by every call
//!
//! # Architecture
//!
//! ```text
//! filters + timeframe ──► QueryBuilder ──► CompositeQuery
//!                                               │
//!                                               ▼
//!                   RateLimiter ◄──── SearchExecutor ────► SearchBackend (HTTP)
//!                   RetryPolicy                 │
//!                                               ▼
//!                                     Vec<DocumentEntry>
//! ```
//!
//! # Example
//!
//! ```no_run
//! use search_lens::search::{HttpSearchBackend, QueryBuilder, SearchConfig, SearchExecutor};
//! use search_lens::search::config::BackendConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(HttpSearchBackend::new(&BackendConfig::default())?);
//!     let executor = SearchExecutor::new(backend, SearchConfig::default());
//!
//!     let query = QueryBuilder::new().build(&["status=active", "age>=5"], 100, "2d", &chrono::Local::now())?;
//!     let result = executor.fetch(&query, "logs-*", 100).await?;
//!     println!("Found {} documents", result.total_hits);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod filter;
pub mod timeframe;

mod backend;
mod document;
mod error;
mod executor;
mod metrics;
mod query;
mod rate_limit;
mod retry;
mod status;

pub use backend::{HitsEnvelope, HttpSearchBackend, SearchBackend, SearchResponse, TotalHits};
pub use config::{BackendConfig, RateLimitConfig, SearchConfig, SearchConfigBuilder};
pub use document::{DocumentEntry, RawHit};
pub use error::{FilterError, QueryBuildError, SearchError, SearchResult, TimeframeError};
pub use executor::{FetchMode, FetchResult, SearchExecutor};
pub use filter::{FilterValue, ParsedClause, RangeOp};
pub use metrics::{gather_metrics, init_search_metrics, SearchMetrics, SEARCH_METRICS};
pub use query::{CompositeQuery, QueryBuilder, SearchSort, SortOrder};
pub use rate_limit::{RateLimitState, RateLimiter};
pub use retry::RetryPolicy;
pub use status::{ChannelStatusSink, StatusEvent, StatusSink, TracingStatusSink};
pub use timeframe::{TimeRange, TimestampFields};
