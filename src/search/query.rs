//! Composite query building

use crate::search::error::{FilterError, QueryBuildError};
use crate::search::filter::{self, ParsedClause};
use crate::search::timeframe::{self, TimeRange, TimestampFields};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Sort order for search results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[default]
    #[serde(rename = "desc")]
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Field to sort by
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchSort {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SearchSort {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }

    fn to_json(&self) -> Value {
        json!({ self.field.as_str(): { "order": self.order.as_str() } })
    }
}

/// AND-combination of parsed filters plus an optional time window
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeQuery {
    pub clauses: Vec<ParsedClause>,
    pub time_range: Option<TimeRange>,
    pub size: usize,
    pub sort: Vec<SearchSort>,
}

impl CompositeQuery {
    /// Query matching every document
    pub fn match_all(size: usize) -> Self {
        Self {
            clauses: Vec::new(),
            time_range: None,
            size,
            sort: Vec::new(),
        }
    }

    /// Number of conditions, counting the time window as one
    pub fn clause_count(&self) -> usize {
        self.clauses.len() + usize::from(self.time_range.is_some())
    }

    pub fn is_match_all(&self) -> bool {
        self.clause_count() == 0
    }

    /// Same conditions with a different page size
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// The `query` part of the request body
    pub fn query_clause(&self) -> Value {
        if self.is_match_all() {
            return json!({ "match_all": {} });
        }

        let must: Vec<Value> = self
            .clauses
            .iter()
            .map(ParsedClause::to_query)
            .chain(self.time_range.iter().map(TimeRange::to_query))
            .collect();
        json!({ "bool": { "must": must } })
    }

    /// Full request body: `{ "query", "size", "sort"? }`
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query_clause());
        body.insert("size".to_string(), json!(self.size));
        if !self.sort.is_empty() {
            body.insert(
                "sort".to_string(),
                Value::Array(self.sort.iter().map(SearchSort::to_json).collect()),
            );
        }
        Value::Object(body)
    }
}

/// Compiles filter expressions and a timeframe into a [`CompositeQuery`]
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    timestamp_fields: TimestampFields,
    sort: Vec<SearchSort>,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fields a timeframe is matched against
    pub fn with_timestamp_fields(mut self, fields: TimestampFields) -> Self {
        self.timestamp_fields = fields;
        self
    }

    /// Set sorting
    pub fn with_sort(mut self, sort: Vec<SearchSort>) -> Self {
        self.sort = sort;
        self
    }

    /// Build a composite query.
    ///
    /// Every filter is parsed before failing, so the returned error lists
    /// all invalid filters (and an invalid timeframe) at once. An empty
    /// `timeframe` adds no time window.
    pub fn build<S, Tz>(
        &self,
        filters: &[S],
        size: usize,
        timeframe: &str,
        now: &DateTime<Tz>,
    ) -> Result<CompositeQuery, QueryBuildError>
    where
        S: AsRef<str>,
        Tz: TimeZone,
    {
        let mut clauses = Vec::with_capacity(filters.len());
        let mut errors: Vec<FilterError> = Vec::new();

        for expr in filters {
            match filter::parse(expr.as_ref()) {
                Ok(clause) => clauses.push(clause),
                Err(e) => errors.push(e),
            }
        }

        let mut timeframe_error = None;
        let mut time_range = None;
        if !timeframe.trim().is_empty() {
            match timeframe::resolve(timeframe, now) {
                Ok(lookback) => {
                    time_range = Some(TimeRange::ending_at(
                        now,
                        lookback,
                        self.timestamp_fields.clone(),
                    ))
                }
                Err(e) => timeframe_error = Some(e),
            }
        }

        if !errors.is_empty() || timeframe_error.is_some() {
            return Err(QueryBuildError {
                filters: errors,
                timeframe: timeframe_error,
            });
        }

        Ok(CompositeQuery {
            clauses,
            time_range,
            size,
            sort: self.sort.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::error::TimeframeError;
    use chrono::Utc;

    #[test]
    fn test_empty_build_matches_everything() {
        let query = QueryBuilder::new()
            .build::<&str, _>(&[], 100, "", &Utc::now())
            .unwrap();
        assert!(query.is_match_all());
        assert_eq!(query.to_body(), json!({ "query": { "match_all": {} }, "size": 100 }));
    }

    #[test]
    fn test_filters_plus_timeframe() {
        let query = QueryBuilder::new()
            .build(&["a=1", "b=2"], 50, "today", &Utc::now())
            .unwrap();
        assert_eq!(query.clause_count(), 3);
        assert_eq!(query.size, 50);

        let body = query.to_body();
        assert_eq!(body["size"], 50);
        assert_eq!(body["query"]["bool"]["must"].as_array().unwrap().len(), 3);
        assert_eq!(body["query"]["bool"]["must"][0], json!({ "term": { "a": 1 } }));
    }

    #[test]
    fn test_collects_every_error() {
        let err = QueryBuilder::new()
            .build(&["1a=x", "ok=1", "age>=old", "*lead"], 10, "5x", &Utc::now())
            .unwrap_err();
        assert_eq!(err.filters.len(), 3);
        assert_eq!(err.filters[0].field, "1a");
        assert_eq!(err.filters[1].field, "age");
        assert_eq!(err.timeframe, Some(TimeframeError::UnknownUnit("x".to_string())));
    }

    #[test]
    fn test_sort_is_carried() {
        let query = QueryBuilder::new()
            .with_sort(vec![SearchSort::new("@timestamp", SortOrder::Descending)])
            .build(&["level=error"], 20, "", &Utc::now())
            .unwrap();
        let body = query.to_body();
        assert_eq!(body["sort"], json!([{ "@timestamp": { "order": "desc" } }]));
    }

    #[test]
    fn test_with_size_keeps_conditions() {
        let query = QueryBuilder::new()
            .build(&["level=error"], 20_000, "1h", &Utc::now())
            .unwrap()
            .with_size(1000);
        assert_eq!(query.size, 1000);
        assert_eq!(query.clause_count(), 2);
    }
}
