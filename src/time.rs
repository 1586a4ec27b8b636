//! Normalization of the timestamp encodings returned by the stop display API.
//!
//! The API mixes epoch milliseconds (as numbers or strings), ISO-8601
//! strings with and without an offset, and bare clock times for near-term
//! departures. Everything is folded into [`DateTime<Utc>`]. Values that
//! cannot be interpreted become `None` and are logged, never raised.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tracing::warn;

const OFFSET_ISO_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"];
const NAIVE_ISO_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
const CLOCK_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

/// Parses a raw JSON time field into an instant.
pub fn parse_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Null => None,
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64));
            match millis.and_then(from_epoch_millis) {
                Some(t) => Some(t),
                None => {
                    warn!(value = %n, "Could not parse time value");
                    None
                }
            }
        }
        Value::String(s) => parse_time_str(s),
        other => {
            warn!(value = %other, "Unexpected time value type");
            None
        }
    }
}

/// Parses a textual timestamp, using today's local date for clock-only input.
pub fn parse_time_str(raw: &str) -> Option<DateTime<Utc>> {
    parse_time_str_on(raw, Local::now().date_naive())
}

pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Same as [`parse_time_str`] with an explicit local date for clock times.
pub fn parse_time_str_on(raw: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(millis) = s.parse::<i64>() {
        return from_epoch_millis(millis);
    }

    if s.contains('T') {
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Some(t.with_timezone(&Utc));
        }
        let with_offset = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
            Some(rest) => format!("{rest}+00:00"),
            None => s.to_string(),
        };
        for fmt in OFFSET_ISO_FORMATS {
            if let Ok(t) = DateTime::parse_from_str(&with_offset, fmt) {
                return Some(t.with_timezone(&Utc));
            }
        }
        for fmt in NAIVE_ISO_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return local_to_utc(naive);
            }
        }
    } else {
        for fmt in CLOCK_FORMATS {
            if let Ok(clock) = NaiveTime::parse_from_str(s, fmt) {
                return local_to_utc(today.and_time(clock));
            }
        }
    }

    warn!(value = raw, "Could not parse time value");
    None
}

fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}
