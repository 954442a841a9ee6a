//! Search Lens
//!
//! Compiles a small filter language into Elasticsearch/OpenSearch queries,
//! fetches results with bounded or cursor retrieval under backend throttling,
//! and keeps a paginated, locally filterable view over documents whose schema
//! is discovered as they arrive.

pub mod browser;
pub mod config;
pub mod error;
pub mod search;

pub use error::{AppError, Result};
