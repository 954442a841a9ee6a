//! Search hits with dynamic field discovery

use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const FIELD_ID: &str = "_id";
pub const FIELD_INDEX: &str = "_index";
pub const FIELD_TYPE: &str = "_type";
pub const FIELD_SCORE: &str = "_score";
pub const FIELD_VERSION: &str = "_version";

/// Epoch-seconds field rendered as an RFC 3339 timestamp
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Field rendered as an integer regardless of its JSON type
pub const SEVERITY_FIELD: &str = "severity";

const DEFAULT_TYPE: &str = "_doc";

/// One hit as returned by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub doc_type: Option<String>,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// A fetched document: fixed metadata plus an arbitrary JSON payload.
///
/// The payload is never mutated after construction and is shared through an
/// `Arc`, so entries are cheap to clone and safe to read from many threads.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    id: String,
    index: String,
    doc_type: String,
    score: Option<f64>,
    version: Option<i64>,
    source: Arc<Value>,
}

impl From<RawHit> for DocumentEntry {
    fn from(hit: RawHit) -> Self {
        Self {
            id: hit.id,
            index: hit.index,
            doc_type: hit.doc_type.unwrap_or_else(|| DEFAULT_TYPE.to_string()),
            score: hit.score,
            version: hit.version,
            source: Arc::new(hit.source),
        }
    }
}

impl DocumentEntry {
    pub fn new(id: impl Into<String>, index: impl Into<String>, source: Value) -> Self {
        Self {
            id: id.into(),
            index: index.into(),
            doc_type: DEFAULT_TYPE.to_string(),
            score: None,
            version: None,
            source: Arc::new(source),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Metadata field names followed by every payload path.
    ///
    /// Objects are flattened with `.`; arrays are listed once as a leaf and
    /// never expanded per element.
    pub fn available_fields(&self) -> Vec<String> {
        let mut fields = vec![
            FIELD_ID.to_string(),
            FIELD_INDEX.to_string(),
            FIELD_TYPE.to_string(),
        ];
        if self.score.is_some() {
            fields.push(FIELD_SCORE.to_string());
        }
        if self.version.is_some() {
            fields.push(FIELD_VERSION.to_string());
        }

        let mut paths = BTreeSet::new();
        if let Value::Object(map) = self.source.as_ref() {
            collect_paths(map, "", &mut paths);
        }
        fields.extend(paths);
        fields
    }

    /// Look up a dot-separated payload path.
    ///
    /// Each segment may carry one `[n]` index into an array value. Any type
    /// mismatch or out-of-range index yields `None`.
    pub fn value(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }

        let mut current = self.source.as_ref();
        for segment in path.split('.') {
            let (key, index) = split_index(segment)?;
            current = current.as_object()?.get(key)?;
            if let Some(i) = index {
                current = current.as_array()?.get(i)?;
            }
        }
        Some(current)
    }

    /// Display string for a field; absent values render empty.
    pub fn formatted(&self, field: &str) -> String {
        match field {
            FIELD_ID => return self.id.clone(),
            FIELD_INDEX => return self.index.clone(),
            FIELD_TYPE => return self.doc_type.clone(),
            FIELD_SCORE => return self.score.map(|s| s.to_string()).unwrap_or_default(),
            FIELD_VERSION => return self.version.map(|v| v.to_string()).unwrap_or_default(),
            _ => {}
        }

        let Some(value) = self.value(field) else {
            return String::new();
        };

        match field {
            TIMESTAMP_FIELD => format_unix_seconds(value).unwrap_or_else(|| stringify(value)),
            SEVERITY_FIELD => format_integer(value).unwrap_or_else(|| stringify(value)),
            _ => stringify(value),
        }
    }

    /// Rebuild the hit in backend shape
    pub fn to_json(&self) -> Value {
        let mut hit = Map::new();
        hit.insert(FIELD_ID.to_string(), json!(self.id));
        hit.insert(FIELD_INDEX.to_string(), json!(self.index));
        hit.insert(FIELD_TYPE.to_string(), json!(self.doc_type));
        if let Some(score) = self.score {
            hit.insert(FIELD_SCORE.to_string(), json!(score));
        }
        if let Some(version) = self.version {
            hit.insert(FIELD_VERSION.to_string(), json!(version));
        }
        hit.insert("_source".to_string(), self.source.as_ref().clone());
        Value::Object(hit)
    }
}

fn collect_paths(map: &Map<String, Value>, prefix: &str, out: &mut BTreeSet<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => collect_paths(inner, &path, out),
            _ => {
                out.insert(path);
            }
        }
    }
}

/// `key[3]` -> (`key`, Some(3)); `key` -> (`key`, None)
fn split_index(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.split_once('[') {
        None => Some((segment, None)),
        Some((key, rest)) => {
            let digits = rest.strip_suffix(']')?;
            let index = digits.parse::<usize>().ok()?;
            Some((key, Some(index)))
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn format_unix_seconds(value: &Value) -> Option<String> {
    let secs = as_f64(value)?;
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn format_integer(value: &Value) -> Option<String> {
    as_f64(value).map(|n| (n.trunc() as i64).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DocumentEntry {
        DocumentEntry::new(
            "doc-1",
            "logs-2024.01.01",
            json!({
                "timestamp": 1704067200,
                "severity": "3",
                "message": "disk almost full",
                "host": { "name": "web-1", "ip": "10.0.0.1" },
                "tags": ["prod", "disk"],
                "events": [ { "code": 7, "detail": { "path": "/var" } } ],
                "empty": {},
                "nothing": null
            }),
        )
        .with_score(1.5)
    }

    #[test]
    fn test_available_fields() {
        let fields = sample().available_fields();
        assert_eq!(&fields[..4], &["_id", "_index", "_type", "_score"]);
        assert!(fields.contains(&"host.name".to_string()));
        assert!(fields.contains(&"host.ip".to_string()));
        assert!(fields.contains(&"tags".to_string()));
        assert!(fields.contains(&"events".to_string()));
        assert!(fields.contains(&"empty".to_string()));
        assert!(!fields.contains(&"host".to_string()));
        assert!(!fields.iter().any(|f| f.starts_with("events.")));
        assert!(!fields.contains(&"_version".to_string()));
    }

    #[test]
    fn test_value_traversal() {
        let doc = sample();
        assert_eq!(doc.value("host.name"), Some(&json!("web-1")));
        assert_eq!(doc.value("events[0].code"), Some(&json!(7)));
        assert_eq!(doc.value("events[0].detail.path"), Some(&json!("/var")));
        assert_eq!(doc.value("tags[1]"), Some(&json!("disk")));
        assert_eq!(doc.value("events[3].code"), None);
        assert_eq!(doc.value("host[0]"), None);
        assert_eq!(doc.value("message.inner"), None);
        assert_eq!(doc.value("events[x]"), None);
        assert_eq!(doc.value("missing"), None);
        assert_eq!(doc.value(""), None);
    }

    #[test]
    fn test_formatting() {
        let doc = sample();
        assert_eq!(doc.formatted("_id"), "doc-1");
        assert_eq!(doc.formatted("_index"), "logs-2024.01.01");
        assert_eq!(doc.formatted("_type"), "_doc");
        assert_eq!(doc.formatted("_score"), "1.5");
        assert_eq!(doc.formatted("_version"), "");
        assert_eq!(doc.formatted("timestamp"), "2024-01-01T00:00:00Z");
        assert_eq!(doc.formatted("severity"), "3");
        assert_eq!(doc.formatted("message"), "disk almost full");
        assert_eq!(doc.formatted("tags"), r#"["prod","disk"]"#);
        assert_eq!(doc.formatted("nothing"), "");
        assert_eq!(doc.formatted("absent"), "");
    }

    #[test]
    fn test_severity_from_number() {
        let doc = DocumentEntry::new("a", "i", json!({ "severity": 4.0 }));
        assert_eq!(doc.formatted("severity"), "4");
        let doc = DocumentEntry::new("a", "i", json!({ "severity": "high" }));
        assert_eq!(doc.formatted("severity"), "high");
    }

    #[test]
    fn test_from_raw_hit() {
        let hit: RawHit = serde_json::from_value(json!({
            "_id": "x1",
            "_index": "logs",
            "_version": 3,
            "_source": { "a": 1 }
        }))
        .unwrap();
        let doc = DocumentEntry::from(hit);
        assert_eq!(doc.doc_type(), "_doc");
        assert_eq!(doc.version(), Some(3));
        assert_eq!(doc.to_json()["_source"], json!({ "a": 1 }));
        assert!(doc.available_fields().contains(&"_version".to_string()));
    }

    #[test]
    fn test_concurrent_reads() {
        let doc = Arc::new(sample());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let doc = Arc::clone(&doc);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert_eq!(doc.value("host.name"), Some(&json!("web-1")));
                        assert_eq!(doc.formatted("events[0].code"), "7");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(doc.source(), sample().source());
    }
}
