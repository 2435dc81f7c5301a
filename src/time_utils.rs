// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and calendar-day math.
//!
//! Calendar days are UTC days rendered as `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::models::DateValue;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Format a UTC timestamp as RFC3339 with millisecond precision and a `Z`
/// suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a `YYYY-MM-DD` day string.
pub fn parse_day(day: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(day, DAY_FORMAT).ok()
}

/// Render a date as a `YYYY-MM-DD` day string.
pub fn format_day(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Resolve a wire date to an instant, if it can be understood.
pub fn to_datetime(value: &DateValue) -> Option<DateTime<Utc>> {
    match value {
        DateValue::Timestamp {
            seconds,
            nanoseconds,
        } => DateTime::from_timestamp(*seconds, *nanoseconds),
        DateValue::Text(text) => parse_text(text.trim()),
        DateValue::Other(_) => None,
    }
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    parse_day(text).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|n| n.and_utc())
}

/// Normalize a wire date to its UTC calendar day.
///
/// Returns `None` for missing or unparseable input; never panics.
/// Normalizing an already-normalized day returns it unchanged.
pub fn normalize_to_day(value: &DateValue) -> Option<String> {
    normalize_to_date(value).map(format_day)
}

/// Like [`normalize_to_day`] but yields the parsed date.
pub fn normalize_to_date(value: &DateValue) -> Option<NaiveDate> {
    to_datetime(value).map(|dt| dt.date_naive())
}

/// Normalize a raw JSON value (as read from a document) to a calendar day.
pub fn normalize_json_to_day(value: &serde_json::Value) -> Option<String> {
    serde_json::from_value::<DateValue>(value.clone())
        .ok()
        .and_then(|v| normalize_to_day(&v))
}

/// Inclusive list of calendar days from `start_day` to `end_day`.
///
/// Empty when either bound is not a valid day or when `start_day` is after
/// `end_day`.
pub fn expand_range(start_day: &str, end_day: &str) -> Vec<String> {
    match (parse_day(start_day), parse_day(end_day)) {
        (Some(start), Some(end)) => expand_dates(start, end).map(format_day).collect(),
        _ => Vec::new(),
    }
}

/// Iterate the inclusive day range between two dates.
pub fn expand_dates(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Number of days in the inclusive range, or `None` when `start > end`.
pub fn span_days(start: NaiveDate, end: NaiveDate) -> Option<usize> {
    let days = (end - start).num_days();
    usize::try_from(days).ok().map(|d| d + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> DateValue {
        DateValue::Text(s.to_string())
    }

    #[test]
    fn test_normalize_backend_timestamp() {
        // 2024-06-01T00:00:00Z
        let value = DateValue::Timestamp {
            seconds: 1_717_200_000,
            nanoseconds: 0,
        };
        assert_eq!(normalize_to_day(&value).as_deref(), Some("2024-06-01"));
    }

    #[test]
    fn test_normalize_iso_strings_in_utc() {
        assert_eq!(
            normalize_to_day(&text("2024-06-01T23:30:00.000Z")).as_deref(),
            Some("2024-06-01")
        );
        // Offsets are converted to UTC before truncation
        assert_eq!(
            normalize_to_day(&text("2024-06-02T01:00:00+09:00")).as_deref(),
            Some("2024-06-01")
        );
        assert_eq!(
            normalize_to_day(&text("2024-06-02T08:15:00")).as_deref(),
            Some("2024-06-02")
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let day = normalize_to_day(&text("2024-02-29T12:00:00Z")).unwrap();
        assert_eq!(normalize_to_day(&text(&day)).as_deref(), Some(day.as_str()));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize_to_day(&text("")), None);
        assert_eq!(normalize_to_day(&text("next tuesday")), None);
        assert_eq!(normalize_to_day(&text("2024-13-40")), None);
        assert_eq!(normalize_to_day(&DateValue::default()), None);
        assert_eq!(
            normalize_to_day(&DateValue::Other(serde_json::json!({"foo": 1}))),
            None
        );
        assert_eq!(
            normalize_to_day(&DateValue::Timestamp {
                seconds: i64::MAX,
                nanoseconds: 0
            }),
            None
        );
    }

    #[test]
    fn test_normalize_json() {
        let value = serde_json::json!({"_seconds": 1_717_286_400, "_nanoseconds": 5});
        assert_eq!(normalize_json_to_day(&value).as_deref(), Some("2024-06-02"));
        assert_eq!(normalize_json_to_day(&serde_json::Value::Null), None);
    }

    #[test]
    fn test_expand_single_day() {
        assert_eq!(expand_range("2024-06-01", "2024-06-01"), vec!["2024-06-01"]);
    }

    #[test]
    fn test_expand_crosses_month_and_leap_day() {
        assert_eq!(
            expand_range("2024-02-28", "2024-03-01"),
            vec!["2024-02-28", "2024-02-29", "2024-03-01"]
        );
    }

    #[test]
    fn test_expand_reversed_or_invalid_is_empty() {
        assert!(expand_range("2024-06-03", "2024-06-01").is_empty());
        assert!(expand_range("garbage", "2024-06-01").is_empty());
        assert!(expand_range("2024-06-01", "").is_empty());
    }

    #[test]
    fn test_span_days() {
        let a = parse_day("2024-01-01").unwrap();
        let b = parse_day("2024-12-31").unwrap();
        assert_eq!(span_days(a, b), Some(366));
        assert_eq!(span_days(b, a), None);
        assert_eq!(expand_dates(a, b).count(), 366);
    }

    #[test]
    fn test_format_utc_rfc3339_uses_z_suffix() {
        let dt = DateTime::from_timestamp(1_717_200_000, 0).unwrap();
        assert_eq!(format_utc_rfc3339(dt), "2024-06-01T00:00:00.000Z");
    }
}
