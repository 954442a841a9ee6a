//! Filter mini-language
//!
//! Compiles one filter expression (`status=active`, `age>=5`, `_id=abc`,
//! `host=web-*`, `level=null`, ...) into a [`ParsedClause`]. Parsing never
//! partially succeeds: an expression either yields exactly one clause or a
//! [`FilterError`] naming the offending field.

use crate::search::error::FilterError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Document id lookup key
pub const ID_KEY: &str = "_id";

/// Reserved deduplication key, matched as an exact term
pub const DEDUP_ID_KEY: &str = "_dedup_id";

/// Operator characters of the `query_string` syntax, other than the wildcards
const QUERY_STRING_RESERVED: &str = "+-=&|><!(){}[]^\"~:/";

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*(\.[A-Za-z][A-Za-z0-9_-]*)*$")
        .expect("field name pattern is valid")
});

/// Check a (possibly dotted) field name
pub fn is_valid_field_name(field: &str) -> bool {
    FIELD_NAME.is_match(field)
}

/// Range comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    /// Backend range-query keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            RangeOp::Gt => ">",
            RangeOp::Gte => ">=",
            RangeOp::Lt => "<",
            RangeOp::Lte => "<=",
        }
    }
}

/// Typed value of an equality clause
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FilterValue {
    /// Integral numbers are sent as integers so they match integer-mapped fields
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                json!(*n as i64)
            }
            FilterValue::Number(n) => json!(n),
            FilterValue::Bool(b) => json!(b),
            FilterValue::Text(s) => json!(s),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// One compiled filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedClause {
    /// Exact term match on a numeric, boolean or reserved-key value
    Equality { field: String, value: FilterValue },
    /// Numeric comparison
    Range { field: String, op: RangeOp, value: f64 },
    /// Pattern in backend wildcard syntax; `None` searches every field
    Wildcard { field: Option<String>, pattern: String },
    /// Field does not exist on the document
    NullCheck { field: String },
    /// Lookup by document id
    IdLookup { id: String },
    /// Phrase match; `None` searches every field
    FreeTextMatch { field: Option<String>, text: String },
}

impl ParsedClause {
    /// Field the clause is scoped to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            ParsedClause::Equality { field, .. }
            | ParsedClause::Range { field, .. }
            | ParsedClause::NullCheck { field } => Some(field.as_str()),
            ParsedClause::Wildcard { field, .. } | ParsedClause::FreeTextMatch { field, .. } => {
                field.as_deref()
            }
            ParsedClause::IdLookup { .. } => Some(ID_KEY),
        }
    }

    /// Render as an Elasticsearch/OpenSearch query DSL clause
    pub fn to_query(&self) -> Value {
        match self {
            ParsedClause::Equality { field, value } => json!({ "term": { field: value.to_json() } }),
            ParsedClause::Range { field, op, value } => {
                json!({ "range": { field: { op.as_str(): value } } })
            }
            ParsedClause::Wildcard {
                field: Some(field),
                pattern,
            } => json!({ "wildcard": { field: { "value": pattern } } }),
            ParsedClause::Wildcard {
                field: None,
                pattern,
            } => json!({
                "query_string": { "query": escape_query_string(pattern), "analyze_wildcard": true }
            }),
            ParsedClause::NullCheck { field } => {
                json!({ "bool": { "must_not": [ { "exists": { "field": field } } ] } })
            }
            ParsedClause::IdLookup { id } => json!({ "ids": { "values": [id] } }),
            ParsedClause::FreeTextMatch {
                field: Some(field),
                text,
            } => json!({ "match_phrase": { field: text } }),
            ParsedClause::FreeTextMatch { field: None, text } => json!({
                "multi_match": { "query": text, "type": "phrase", "fields": ["*"] }
            }),
        }
    }
}

/// Escape `query_string` operators in a wildcard pattern. Backslash
/// escapes and the `*`/`?` wildcards pass through unchanged.
fn escape_query_string(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            c if c.is_whitespace() || QUERY_STRING_RESERVED.contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for ParsedClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedClause::Equality { field, value } => write!(f, "{} = {}", field, value),
            ParsedClause::Range { field, op, value } => {
                write!(f, "{} {} {}", field, op.symbol(), value)
            }
            ParsedClause::Wildcard { field, pattern } => {
                write!(f, "{} ~ {:?}", field.as_deref().unwrap_or("*"), pattern)
            }
            ParsedClause::NullCheck { field } => write!(f, "{} is missing", field),
            ParsedClause::IdLookup { id } => write!(f, "{} = {:?}", ID_KEY, id),
            ParsedClause::FreeTextMatch { field, text } => {
                write!(f, "{} contains {:?}", field.as_deref().unwrap_or("*"), text)
            }
        }
    }
}

impl FromStr for ParsedClause {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Compile a single filter expression
pub fn parse(expr: &str) -> Result<ParsedClause, FilterError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(FilterError::new("", "filter is empty"));
    }

    if let Some(id) = expr.strip_prefix("_id=") {
        if id.is_empty() {
            return Err(FilterError::new(ID_KEY, "document id is empty"));
        }
        return Ok(ParsedClause::IdLookup { id: id.to_string() });
    }
    if let Some(dedup) = expr
        .strip_prefix(DEDUP_ID_KEY)
        .and_then(|rest| rest.strip_prefix('='))
    {
        if dedup.is_empty() {
            return Err(FilterError::new(DEDUP_ID_KEY, "value is empty"));
        }
        return Ok(ParsedClause::Equality {
            field: DEDUP_ID_KEY.to_string(),
            value: FilterValue::Text(dedup.to_string()),
        });
    }

    if let Some(pos) = expr.find(['>', '<']) {
        return parse_range(expr, pos);
    }

    match split_field(expr) {
        Some((field, raw)) => parse_field_value(field, raw),
        None => parse_value_search(expr),
    }
}

fn validate_field(field: &str) -> Result<(), FilterError> {
    if field.is_empty() {
        return Err(FilterError::new(field, "field name is empty"));
    }
    if !is_valid_field_name(field) {
        return Err(FilterError::new(
            field,
            "invalid field name (letters, digits, '_' and '-', dot-separated, starting with a letter)",
        ));
    }
    Ok(())
}

fn parse_range(expr: &str, pos: usize) -> Result<ParsedClause, FilterError> {
    let field = expr[..pos].trim();
    validate_field(field)?;

    let rest = &expr[pos..];
    let (op, operand) = if let Some(v) = rest.strip_prefix(">=") {
        (RangeOp::Gte, v)
    } else if let Some(v) = rest.strip_prefix('>') {
        (RangeOp::Gt, v)
    } else if let Some(v) = rest.strip_prefix("<=") {
        (RangeOp::Lte, v)
    } else if let Some(v) = rest.strip_prefix('<') {
        (RangeOp::Lt, v)
    } else {
        unreachable!("range scan stopped on a comparison operator")
    };

    let operand = operand.trim();
    let value = parse_number(operand).ok_or_else(|| {
        FilterError::new(field, format!("range value '{}' is not a number", operand))
    })?;

    Ok(ParsedClause::Range {
        field: field.to_string(),
        op,
        value,
    })
}

/// Split on the first unescaped `=`. A left side carrying escape sequences
/// is literal text rather than a field reference.
fn split_field(expr: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in expr.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' => {
                let field = &expr[..i];
                if field.contains('\\') {
                    return None;
                }
                return Some((field.trim(), expr[i + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

fn parse_field_value(field: &str, raw: &str) -> Result<ParsedClause, FilterError> {
    validate_field(field)?;
    if raw.is_empty() {
        return Err(FilterError::new(field, "value is empty"));
    }

    if raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("nil") {
        return Ok(ParsedClause::NullCheck {
            field: field.to_string(),
        });
    }
    if let Some(n) = parse_number(raw) {
        return Ok(ParsedClause::Equality {
            field: field.to_string(),
            value: FilterValue::Number(n),
        });
    }
    if let Some(b) = parse_bool(raw) {
        return Ok(ParsedClause::Equality {
            field: field.to_string(),
            value: FilterValue::Bool(b),
        });
    }

    text_clause(Some(field), raw)
}

fn parse_value_search(expr: &str) -> Result<ParsedClause, FilterError> {
    text_clause(None, expr)
}

fn text_clause(field: Option<&str>, raw: &str) -> Result<ParsedClause, FilterError> {
    let pieces = scan(raw);
    let has_wildcard = pieces.iter().any(|p| !matches!(p, Piece::Char(_)));

    if !has_wildcard {
        return Ok(ParsedClause::FreeTextMatch {
            field: field.map(str::to_string),
            text: literal(&pieces),
        });
    }
    if matches!(pieces.first(), Some(Piece::AnyChars | Piece::AnyChar)) {
        return Err(FilterError::new(
            field.unwrap_or(raw),
            "leading wildcards are not allowed",
        ));
    }

    Ok(ParsedClause::Wildcard {
        field: field.map(str::to_string),
        pattern: wildcard_pattern(&pieces),
    })
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Piece {
    Char(char),
    AnyChars,
    AnyChar,
}

/// Tokenise a raw value. `\\`, `\*`, `\?` and `\=` resolve to the literal
/// character; any other escaped character keeps its backslash.
fn scan(raw: &str) -> Vec<Piece> {
    let mut pieces = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(e @ ('\\' | '*' | '?' | '=')) => pieces.push(Piece::Char(e)),
                Some(other) => {
                    pieces.push(Piece::Char('\\'));
                    pieces.push(Piece::Char(other));
                }
                None => pieces.push(Piece::Char('\\')),
            },
            '*' => pieces.push(Piece::AnyChars),
            '?' => pieces.push(Piece::AnyChar),
            _ => pieces.push(Piece::Char(c)),
        }
    }
    pieces
}

fn literal(pieces: &[Piece]) -> String {
    pieces
        .iter()
        .map(|p| match p {
            Piece::Char(c) => *c,
            Piece::AnyChars => '*',
            Piece::AnyChar => '?',
        })
        .collect()
}

fn wildcard_pattern(pieces: &[Piece]) -> String {
    let mut out = String::with_capacity(pieces.len() + 4);
    for p in pieces {
        match p {
            Piece::Char(c @ ('*' | '?' | '\\')) => {
                out.push('\\');
                out.push(*c);
            }
            Piece::Char(c) => out.push(*c),
            Piece::AnyChars => out.push('*'),
            Piece::AnyChar => out.push('?'),
        }
    }
    out
}
