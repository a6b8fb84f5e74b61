//! Program time normalization.
//!
//! Panels send start/end as epoch seconds, epoch milliseconds (numbers or
//! numeric strings) or formatted dates.  Anything unreadable is `None`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Below this magnitude an epoch number is read as seconds, above as millis.
const SECONDS_MAGNITUDE_LIMIT: f64 = 1e11;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub fn parse_epg_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch_number),
        Value::String(s) => parse_epg_time_str(s),
        _ => None,
    }
}

pub fn parse_epg_time_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<f64>() {
        return from_epoch_number(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // XMLTV style, e.g. "20240101200000 +0100"
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y%m%d%H%M%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn from_epoch_number(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let millis = if n.abs() < SECONDS_MAGNITUDE_LIMIT {
        n * 1000.0
    } else {
        n
    };
    DateTime::from_timestamp_millis(millis as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seconds_and_millis_agree() {
        let secs = parse_epg_time(&json!(1_700_000_000)).unwrap();
        let millis = parse_epg_time(&json!(1_700_000_000_000i64)).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_numeric_string() {
        let dt = parse_epg_time(&json!("1700000000")).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_date_strings() {
        let dt = parse_epg_time_str("2024-03-01 20:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T20:30:00+00:00");
        let dt = parse_epg_time_str("2024-03-01T20:30:00+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T18:30:00+00:00");
        let dt = parse_epg_time_str("20240301203000 +0100").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T19:30:00+00:00");
    }

    #[test]
    fn test_unparsable_is_none() {
        assert!(parse_epg_time(&json!("tomorrow-ish")).is_none());
        assert!(parse_epg_time(&json!("")).is_none());
        assert!(parse_epg_time(&json!(null)).is_none());
        assert!(parse_epg_time(&json!({"a": 1})).is_none());
    }
}
