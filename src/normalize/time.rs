//! Timestamp normalization.
//!
//! The remote emits RFC3339 (with and without sub-second precision), a
//! space-separated date-time form, and Unix epoch numbers. Unknown formats
//! yield `None`, never a panic.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Epoch values at or above this are taken as milliseconds; observed
/// payloads mix seconds and milliseconds.
const EPOCH_MILLIS_FLOOR: i64 = 1_000_000_000_000;

/// Parse a timestamp from any of the observed wire forms.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return from_epoch(i);
            }
            let f = n.as_f64()?;
            if f.is_finite() {
                return from_epoch(f as i64);
            }
            None
        }
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// Parse a timestamp string: RFC3339 first, then the space-separated form,
/// then a numeric epoch.
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(epoch) = s.parse::<i64>() {
        return from_epoch(epoch);
    }

    None
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value >= EPOCH_MILLIS_FLOOR {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}
