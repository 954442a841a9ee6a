//! Search configuration

use crate::search::error::SearchError;
use crate::search::query::{SearchSort, SortOrder};
use crate::search::timeframe::TimestampFields;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the document-search backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the cluster, e.g. `https://search.example.com:9200`
    pub endpoint: String,

    /// Index or index pattern searched by default
    pub index: String,

    /// Basic-auth user
    pub username: Option<String>,

    /// Basic-auth password
    pub password: Option<String>,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index: "logs-*".to_string(),
            username: None,
            password: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Throttling backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Backoff after the first throttled call (milliseconds)
    pub base_backoff_ms: u64,

    /// Upper bound for the backoff (milliseconds)
    pub max_backoff_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

/// Search execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Requests above this size switch to cursor (scroll) retrieval
    pub cursor_threshold: usize,

    /// Documents per cursor batch
    pub batch_size: usize,

    /// Cursor keep-alive, in backend time syntax (`1m`, `30s`)
    pub scroll_ttl: String,

    /// Maximum attempts per backend call while throttled
    pub max_attempts: u32,

    /// Overall deadline for one fetch (seconds)
    pub fetch_timeout_secs: u64,

    /// Result size used when the caller does not pick one
    pub default_size: usize,

    /// Epoch-seconds timestamp field
    pub timestamp_field: String,

    /// Epoch-milliseconds timestamp field
    pub timestamp_millis_field: String,

    /// Sort applied to every query
    pub sort: Vec<SearchSort>,

    /// Backoff settings
    pub rate_limit: RateLimitConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cursor_threshold: 10_000,
            batch_size: 1_000,
            scroll_ttl: "1m".to_string(),
            max_attempts: 5,
            fetch_timeout_secs: 120,
            default_size: 500,
            timestamp_field: "timestamp".to_string(),
            timestamp_millis_field: "@timestamp".to_string(),
            sort: vec![SearchSort::new("@timestamp", SortOrder::Descending)],
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Create a new builder for SearchConfig
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn timestamp_fields(&self) -> TimestampFields {
        TimestampFields {
            seconds: self.timestamp_field.clone(),
            millis: self.timestamp_millis_field.clone(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.batch_size == 0 {
            return Err(SearchError::InvalidConfiguration(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.cursor_threshold == 0 {
            return Err(SearchError::InvalidConfiguration(
                "cursor_threshold must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(SearchError::InvalidConfiguration(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(SearchError::InvalidConfiguration(
                "fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.scroll_ttl.trim().is_empty() {
            return Err(SearchError::InvalidConfiguration(
                "scroll_ttl must not be empty".to_string(),
            ));
        }
        if self.rate_limit.base_backoff_ms > self.rate_limit.max_backoff_ms {
            return Err(SearchError::InvalidConfiguration(
                "base_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn cursor_threshold(mut self, threshold: usize) -> Self {
        self.config.cursor_threshold = threshold;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn scroll_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.config.scroll_ttl = ttl.into();
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn default_size(mut self, size: usize) -> Self {
        self.config.default_size = size;
        self
    }

    pub fn sort(mut self, sort: Vec<SearchSort>) -> Self {
        self.config.sort = sort;
        self
    }

    pub fn backoff_ms(mut self, base: u64, max: u64) -> Self {
        self.config.rate_limit = RateLimitConfig {
            base_backoff_ms: base,
            max_backoff_ms: max,
        };
        self
    }

    pub fn build(self) -> Result<SearchConfig, SearchError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
