//! Error types for query compilation and search execution

use std::fmt;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// A filter expression that failed to compile.
///
/// Always names the offending field (or the raw expression when no field
/// could be identified) so every invalid filter can be reported at once.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FilterError {
    pub field: String,
    pub message: String,
}

impl FilterError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors produced while resolving a relative timeframe
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeframeError {
    #[error("timeframe is empty")]
    Empty,

    #[error("invalid timeframe magnitude '{0}'")]
    InvalidMagnitude(String),

    #[error("unknown timeframe unit '{0}' (expected h, d or w)")]
    UnknownUnit(String),
}

/// Aggregate of every problem found while building a composite query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuildError {
    pub filters: Vec<FilterError>,
    pub timeframe: Option<TimeframeError>,
}

impl QueryBuildError {
    pub fn new(filters: Vec<FilterError>) -> Self {
        Self {
            filters,
            timeframe: None,
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len() + usize::from(self.timeframe.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for QueryBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.filters.iter().map(ToString::to_string).collect();
        if let Some(ref tf) = self.timeframe {
            parts.push(format!("timeframe: {}", tf));
        }
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for QueryBuildError {}

/// Errors that can occur while talking to the search backend
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Backend signalled request throttling (retryable)
    #[error("Rate limit exceeded: {0}")]
    Throttled(String),

    /// Backend answered with a non-success status
    #[error("Backend returned status {status}: {body}")]
    Backend { status: u16, body: String },

    /// Request could not be delivered
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Operation exceeded its overall deadline
    #[error("Search timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Retry budget exhausted while throttled
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SearchError> },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

const THROTTLE_MARKERS: &[&str] = &["rate limit", "too many requests", "throttl", "rate exceeded"];

impl SearchError {
    /// Classify a non-success HTTP answer, recognising throttling by
    /// status 429 or by a rate-limit marker in the body.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 || contains_throttle_marker(&body) {
            SearchError::Throttled(body)
        } else {
            SearchError::Backend { status, body }
        }
    }

    /// Only throttling is worth retrying; everything else aborts the fetch
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Throttled(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            SearchError::Throttled(_) => "RATE_LIMIT_EXCEEDED",
            SearchError::Backend { .. } => "BACKEND_ERROR",
            SearchError::Transport(_) => "NETWORK_ERROR",
            SearchError::Decode(_) => "DECODE_ERROR",
            SearchError::Timeout(_) => "TIMEOUT",
            SearchError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            SearchError::InvalidConfiguration(_) => "CONFIGURATION_ERROR",
        }
    }
}

pub(crate) fn contains_throttle_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    THROTTLE_MARKERS.iter().any(|m| lower.contains(m))
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            SearchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SearchError::from_status(status.as_u16(), err.to_string())
        } else {
            SearchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Decode(err.to_string())
    }
}
