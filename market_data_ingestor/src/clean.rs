//! Normalization of raw provider tables into canonical [`Bar`]s.
//!
//! Cleaning never fails: rows that cannot be used are dropped and counted, cells
//! that cannot be coerced become missing values and are reported. The
//! [`CleanReport`] says what happened so callers can log it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    models::{bar::Bar, raw_table::RawTable, timeframe::TimeFrame},
    timestamp::parse_timestamp,
};

const VALUE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Timestamp header the chart provider emits for an interval.
pub fn default_timestamp_column(timeframe: &TimeFrame) -> &'static str {
    if timeframe.is_intraday() {
        "Datetime"
    } else {
        "Date"
    }
}

/// A kept row that has at least one missing value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingValueRow {
    pub timestamp: DateTime<Utc>,
    pub columns: Vec<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    /// The first data row was promoted to header.
    pub header_recovered: bool,
    /// Rows dropped because a value cell carried the symbol.
    pub symbol_rows_dropped: usize,
    pub unparseable_timestamps: usize,
    /// Later rows dropped for repeating an earlier timestamp.
    pub duplicate_timestamps: usize,
    pub missing_value_rows: Vec<MissingValueRow>,
}

impl CleanReport {
    pub fn dropped_rows(&self) -> usize {
        self.symbol_rows_dropped + self.unparseable_timestamps + self.duplicate_timestamps
    }

    pub fn is_clean(&self) -> bool {
        !self.header_recovered && self.dropped_rows() == 0 && self.missing_value_rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned {
    /// One bar per distinct timestamp, in input order.
    pub bars: Vec<Bar>,
    pub report: CleanReport,
}

/// Clean one raw table for `symbol`.
///
/// Steps, in order:
/// 1. When `timestamp_column` is not a header but appears in the first row,
///    that row becomes the header. Without either, column 0 holds timestamps.
/// 2. Rows whose non-numeric value cells contain `symbol` are dropped.
/// 3. Timestamps are parsed leniently; rows that fail are dropped.
/// 4. `open`..`volume` are matched by name, case-insensitively, and coerced to
///    numbers. Absent columns, unparseable and non-finite cells, and negative
///    volumes become missing.
/// 5. Rows with missing values are kept and listed in the report.
///
/// Duplicate timestamps keep the first row.
pub fn clean(raw: RawTable, symbol: &str, timestamp_column: &str) -> Cleaned {
    let mut report = CleanReport::default();
    let RawTable {
        mut headers,
        mut rows,
    } = raw;

    if !has_column(&headers, timestamp_column)
        && rows
            .first()
            .is_some_and(|first| has_column(first, timestamp_column))
    {
        headers = rows.remove(0);
        report.header_recovered = true;
    }

    let ts_idx = column_position(&headers, timestamp_column).unwrap_or(0);
    let value_idx: Vec<Option<usize>> = VALUE_COLUMNS
        .iter()
        .map(|name| column_position(&headers, name))
        .collect();

    let symbol = symbol.trim();
    let mut seen = HashSet::with_capacity(rows.len());
    let mut bars = Vec::with_capacity(rows.len());

    for row in rows {
        if !symbol.is_empty() && carries_symbol(&row, ts_idx, symbol) {
            report.symbol_rows_dropped += 1;
            continue;
        }

        let Some(timestamp) = row.get(ts_idx).and_then(|c| parse_timestamp(c)) else {
            report.unparseable_timestamps += 1;
            continue;
        };

        if !seen.insert(timestamp) {
            report.duplicate_timestamps += 1;
            continue;
        }

        let value = |i: usize| {
            value_idx[i]
                .and_then(|idx| row.get(idx))
                .and_then(|c| parse_number(c))
        };
        let bar = Bar {
            timestamp,
            open: value(0),
            high: value(1),
            low: value(2),
            close: value(3),
            volume: value(4).filter(|v| *v >= 0.0),
        };

        if bar.has_missing() {
            report.missing_value_rows.push(MissingValueRow {
                timestamp,
                columns: bar.missing_columns(),
            });
        }
        bars.push(bar);
    }

    Cleaned { bars, report }
}

fn has_column(cells: &[String], name: &str) -> bool {
    column_position(cells, name).is_some()
}

fn column_position(cells: &[String], name: &str) -> Option<usize> {
    cells.iter().position(|c| c.trim().eq_ignore_ascii_case(name))
}

fn carries_symbol(row: &[String], ts_idx: usize, symbol: &str) -> bool {
    row.iter()
        .enumerate()
        .any(|(i, cell)| i != ts_idx && cell.contains(symbol) && parse_number(cell).is_none())
}

fn parse_number(cell: &str) -> Option<f64> {
    let s = cell.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn well_formed_table_passes_through() {
        let raw = table(
            &["Date", "Open", "High", "Low", "Close", "Volume"],
            &[
                &["2024-01-02", "1", "2", "0.5", "1.5", "100"],
                &["2024-01-03", "1.5", "2.5", "1", "2", "200"],
            ],
        );
        let cleaned = clean(raw, "AAPL", "Date");
        assert!(cleaned.report.is_clean());
        assert_eq!(
            cleaned.bars,
            vec![
                Bar::new(day(2), 1.0, 2.0, 0.5, 1.5, 100.0),
                Bar::new(day(3), 1.5, 2.5, 1.0, 2.0, 200.0),
            ]
        );
    }

    #[test]
    fn multi_index_artifacts_are_repaired() {
        // Shape of a flattened two-level header: price row, ticker row, date row.
        let raw = table(
            &["Price", "Close", "High", "Low", "Open", "Volume"],
            &[
                &["Date", "Close", "High", "Low", "Open", "Volume"],
                &["Ticker", "AAPL", "AAPL", "AAPL", "AAPL", "AAPL"],
                &["2024-01-02", "1.5", "2", "0.5", "1", "100"],
            ],
        );
        let cleaned = clean(raw, "AAPL", "Date");
        assert!(cleaned.report.header_recovered);
        assert_eq!(cleaned.report.symbol_rows_dropped, 1);
        assert_eq!(
            cleaned.bars,
            vec![Bar::new(day(2), 1.0, 2.0, 0.5, 1.5, 100.0)]
        );
    }

    #[test]
    fn column_zero_is_used_without_a_named_header() {
        let raw = table(&["", "close"], &[&["2024-01-02", "3"]]);
        let cleaned = clean(raw, "AAPL", "Date");
        assert!(!cleaned.report.header_recovered);
        assert_eq!(cleaned.bars.len(), 1);
        assert_eq!(cleaned.bars[0].close, Some(3.0));
        assert_eq!(
            cleaned.report.missing_value_rows[0].columns,
            vec!["open", "high", "low", "volume"]
        );
    }

    #[test]
    fn bad_timestamps_are_dropped() {
        let raw = table(
            &["Date", "Close"],
            &[&["not a date", "1"], &["", "2"], &["2024-01-04", "3"]],
        );
        let cleaned = clean(raw, "AAPL", "Date");
        assert_eq!(cleaned.report.unparseable_timestamps, 2);
        assert_eq!(cleaned.bars.len(), 1);
        assert_eq!(cleaned.bars[0].timestamp, day(4));
    }

    #[test]
    fn non_numeric_close_is_missing_and_reported() {
        let raw = table(
            &["Date", "Open", "High", "Low", "Close", "Volume"],
            &[&["2024-01-02", "1", "2", "0.5", "abc", "100"]],
        );
        let cleaned = clean(raw, "AAPL", "Date");
        assert_eq!(cleaned.bars.len(), 1);
        assert_eq!(cleaned.bars[0].close, None);
        assert_eq!(cleaned.bars[0].open, Some(1.0));
        assert_eq!(
            cleaned.report.missing_value_rows,
            vec![MissingValueRow {
                timestamp: day(2),
                columns: vec!["close"],
            }]
        );
    }

    #[test]
    fn non_finite_and_negative_volume_are_missing() {
        let raw = table(
            &["Date", "Open", "High", "Low", "Close", "Volume"],
            &[&["2024-01-02", "NaN", "inf", "0.5", "1", "-5"]],
        );
        let bar = &clean(raw, "AAPL", "Date").bars[0];
        assert_eq!(bar.open, None);
        assert_eq!(bar.high, None);
        assert_eq!(bar.low, Some(0.5));
        assert_eq!(bar.volume, None);
    }

    #[test]
    fn duplicate_timestamps_keep_first() {
        let raw = table(
            &["Datetime", "Close"],
            &[
                &["2024-01-02T14:30:00Z", "1"],
                &["2024-01-02 09:30:00-05:00", "2"],
                &["2024-01-02T14:35:00Z", "3"],
            ],
        );
        let cleaned = clean(raw, "AAPL", "Datetime");
        assert_eq!(cleaned.report.duplicate_timestamps, 1);
        let closes: Vec<_> = cleaned.bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![Some(1.0), Some(3.0)]);
    }

    #[test]
    fn numeric_cells_never_count_as_symbol_artifacts() {
        // A one-letter symbol must not match exponent notation or timestamps.
        let raw = table(
            &["Datetime", "Close", "Volume"],
            &[&["2024-01-02T14:30:00Z", "1E2", "10"]],
        );
        let cleaned = clean(raw, "E", "Datetime");
        assert_eq!(cleaned.report.symbol_rows_dropped, 0);
        assert_eq!(cleaned.bars[0].close, Some(100.0));
    }

    #[test]
    fn empty_table_cleans_to_nothing() {
        let cleaned = clean(RawTable::default(), "AAPL", "Date");
        assert!(cleaned.bars.is_empty());
        assert!(cleaned.report.is_clean());
    }
}
