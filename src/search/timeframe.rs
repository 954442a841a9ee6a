//! Relative timeframes (`today`, `week`, `36h`, `2d`, `1w`, ...)

use crate::search::error::TimeframeError;
use chrono::{DateTime, TimeZone, Timelike};
use serde_json::{json, Value};
use std::time::Duration;

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Resolve a timeframe expression to a look-back duration ending at `now`.
///
/// `today` measures from midnight in the time zone of `now`.
pub fn resolve<Tz: TimeZone>(expr: &str, now: &DateTime<Tz>) -> Result<Duration, TimeframeError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(TimeframeError::Empty);
    }

    match expr.to_ascii_lowercase().as_str() {
        "today" => return Ok(since_midnight(now)),
        "week" => return Ok(Duration::from_secs(7 * DAY)),
        "month" => return Ok(Duration::from_secs(30 * DAY)),
        "quarter" => return Ok(Duration::from_secs(90 * DAY)),
        "year" => return Ok(Duration::from_secs(365 * DAY)),
        _ => {}
    }

    let split = expr
        .char_indices()
        .last()
        .map(|(i, _)| i)
        .unwrap_or_default();
    let (magnitude, unit) = expr.split_at(split);

    if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeframeError::InvalidMagnitude(magnitude.to_string()));
    }
    let magnitude: u64 = magnitude
        .parse()
        .map_err(|_| TimeframeError::InvalidMagnitude(magnitude.to_string()))?;

    let unit_secs = match unit.to_ascii_lowercase().as_str() {
        "h" => HOUR,
        "d" => DAY,
        "w" => 7 * DAY,
        _ => return Err(TimeframeError::UnknownUnit(unit.to_string())),
    };

    magnitude
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| TimeframeError::InvalidMagnitude(magnitude.to_string()))
}

/// Elapsed time since local midnight, so a daylight-saving shift earlier in
/// the day is counted.
fn since_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest())
        .and_then(|midnight| now.clone().signed_duration_since(midnight).to_std().ok())
        .unwrap_or_else(|| wall_clock_since_midnight(now))
}

/// Fallback for zones where midnight falls in a daylight-saving gap
fn wall_clock_since_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let time = now.naive_local().time();
    Duration::new(
        u64::from(time.num_seconds_from_midnight()),
        time.nanosecond() % 1_000_000_000,
    )
}

/// Backend timestamp fields a time range is matched against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFields {
    /// Field holding epoch seconds
    pub seconds: String,
    /// Field holding epoch milliseconds
    pub millis: String,
}

impl Default for TimestampFields {
    fn default() -> Self {
        Self {
            seconds: "timestamp".to_string(),
            millis: "@timestamp".to_string(),
        }
    }
}

/// A resolved `[now - lookback, now]` window
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub start_millis: i64,
    pub end_millis: i64,
    pub fields: TimestampFields,
}

impl TimeRange {
    pub fn ending_at<Tz: TimeZone>(now: &DateTime<Tz>, lookback: Duration, fields: TimestampFields) -> Self {
        let end_millis = now.timestamp_millis();
        let lookback_millis = i64::try_from(lookback.as_millis()).unwrap_or(i64::MAX);
        Self {
            start_millis: end_millis.saturating_sub(lookback_millis),
            end_millis,
            fields,
        }
    }

    /// Either timestamp representation may satisfy the range, since
    /// documents in one index pattern do not agree on a schema.
    pub fn to_query(&self) -> Value {
        json!({
            "bool": {
                "should": [
                    { "range": { self.fields.seconds.as_str(): {
                        "gte": self.start_millis.div_euclid(1000),
                        "lte": self.end_millis.div_euclid(1000)
                    } } },
                    { "range": { self.fields.millis.as_str(): {
                        "gte": self.start_millis,
                        "lte": self.end_millis,
                        "format": "epoch_millis"
                    } } }
                ],
                "minimum_should_match": 1
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Local, Utc};
    use chrono_tz::America::New_York;

    #[test]
    fn test_keywords() {
        let now = Utc::now();
        assert_eq!(resolve("week", &now).unwrap(), Duration::from_secs(7 * DAY));
        assert_eq!(resolve("MONTH", &now).unwrap(), Duration::from_secs(30 * DAY));
        assert_eq!(resolve("Quarter", &now).unwrap(), Duration::from_secs(90 * DAY));
        assert_eq!(resolve("year", &now).unwrap(), Duration::from_secs(365 * DAY));
    }

    #[test]
    fn test_today_is_time_since_midnight() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 10, 14, 30, 15).unwrap();
        assert_eq!(
            resolve("today", &now).unwrap(),
            Duration::from_secs(14 * 3600 + 30 * 60 + 15)
        );

        let local = Local::now();
        let midnight = Local
            .from_local_datetime(&local.date_naive().and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .unwrap();
        let expected = (local - midnight).to_std().unwrap();
        assert_eq!(resolve("today", &local).unwrap(), expected);
    }

    #[test]
    fn test_today_spans_daylight_saving_change() {
        // clocks jump from 02:00 to 03:00, so noon is only 11 hours after midnight
        let spring = New_York.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(resolve("today", &spring).unwrap(), Duration::from_secs(11 * HOUR));

        let autumn = New_York.with_ymd_and_hms(2024, 11, 3, 12, 0, 0).unwrap();
        assert_eq!(resolve("today", &autumn).unwrap(), Duration::from_secs(13 * HOUR));

        let range = TimeRange::ending_at(
            &spring,
            resolve("today", &spring).unwrap(),
            TimestampFields::default(),
        );
        let midnight = New_York.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(range.start_millis, midnight.timestamp_millis());
    }

    #[test]
    fn test_units() {
        let now = Utc::now();
        assert_eq!(resolve("2d", &now).unwrap(), Duration::from_secs(48 * HOUR));
        assert_eq!(resolve("36H", &now).unwrap(), Duration::from_secs(36 * HOUR));
        assert_eq!(resolve("1w", &now).unwrap(), Duration::from_secs(7 * DAY));
        assert_eq!(resolve("0h", &now).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_expressions() {
        let now = Utc::now();
        assert_eq!(resolve("", &now), Err(TimeframeError::Empty));
        assert!(matches!(resolve("-1h", &now), Err(TimeframeError::InvalidMagnitude(_))));
        assert!(matches!(resolve("h", &now), Err(TimeframeError::InvalidMagnitude(_))));
        assert!(matches!(resolve("abcd", &now), Err(TimeframeError::InvalidMagnitude(_))));
        assert!(matches!(resolve("5x", &now), Err(TimeframeError::UnknownUnit(_))));
        assert!(matches!(resolve("5", &now), Err(TimeframeError::InvalidMagnitude(_))));
    }

    #[test]
    fn test_range_clause_covers_both_fields() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let range = TimeRange::ending_at(&now, Duration::from_secs(3600), TimestampFields::default());
        let query = range.to_query();

        let should = query["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(query["bool"]["minimum_should_match"], 1);
        assert_eq!(
            should[0]["range"]["timestamp"]["gte"],
            json!(now.timestamp() - 3600)
        );
        assert_eq!(
            should[1]["range"]["@timestamp"]["lte"],
            json!(now.timestamp_millis())
        );
        assert_eq!(should[1]["range"]["@timestamp"]["format"], "epoch_millis");
    }
}
