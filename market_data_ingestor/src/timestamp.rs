//! Lenient timestamp parsing for provider output.
//!
//! Provider tables carry timestamps in several shapes depending on interval and
//! export path. [`parse_timestamp`] accepts, in order:
//! - RFC-3339 with offset (`2024-03-10T09:30:00-05:00`)
//! - space-separated with offset (`2024-03-10 09:30:00-05:00`, pandas style)
//! - naive date-time, taken as UTC (`2024-03-10 14:30:00`, `2024-03-10T14:30:00`)
//! - bare date, midnight UTC (`2024-03-10`)
//! - integer epoch seconds, or milliseconds when the value is too large for seconds
//!
//! Anything else yields `None`; callers drop such rows instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z"];
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Epoch values above this are read as milliseconds (year 5138 in seconds).
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }
    if let Ok(epoch) = s.parse::<i64>() {
        return if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
    }
    None
}

/// Format a UTC datetime as RFC-3339 with a `Z` suffix and only as much
/// sub-second precision as the value carries.
pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_rfc3339_offset_to_utc() {
        let got = parse_timestamp("2024-03-10T09:30:00-05:00").expect("parse");
        let want = Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap();
        assert_eq!(got, want);
    }

    #[test]
    fn pandas_style_offset() {
        let got = parse_timestamp("2024-03-10 09:30:00-05:00").unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap());
        let got = parse_timestamp("2024-03-10 14:30:00+00:00").unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap());
    }

    #[test]
    fn naive_values_are_utc() {
        let want = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-15 14:30:00"), Some(want));
        assert_eq!(parse_timestamp("2024-01-15T14:30:00"), Some(want));
        assert_eq!(
            parse_timestamp(" 2024-01-15 "),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn epoch_seconds_and_millis() {
        let want = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("1704205800"), Some(want));
        assert_eq!(parse_timestamp("1704205800000"), Some(want));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("AAPL"), None);
        assert_eq!(parse_timestamp("2024-13-40"), None);
        assert_eq!(parse_timestamp("Date"), None);
    }

    #[test]
    fn rfc3339_output_round_trips() {
        let ts = Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap();
        let s = to_rfc3339(ts);
        assert_eq!(s, "2024-11-03T05:30:00Z");
        assert_eq!(parse_timestamp(&s), Some(ts));
    }
}
