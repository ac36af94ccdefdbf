//! Series identity and the interval classes that group identities.

use std::fmt;

use chrono::Duration;
use indexmap::IndexMap;
use market_data_ingestor::{
    clean::default_timestamp_column,
    models::{request_params::Lookback, timeframe::TimeFrame},
    providers::yahoo_chart::params::lookback_cap,
};
use serde::{Deserialize, Serialize};

/// `(symbol, interval)`; each identity owns exactly one master table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesId {
    pub symbol: String,
    pub interval: TimeFrame,
}

impl SeriesId {
    /// Symbols are trimmed and upper-cased.
    pub fn new(symbol: &str, interval: TimeFrame) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            interval,
        }
    }

    /// `<SYMBOL>_<interval>`, with `%`, `/` and backslash in the symbol
    /// percent-escaped so distinct symbols never share a file.
    pub fn file_stem(&self) -> String {
        let mut symbol = String::with_capacity(self.symbol.len());
        for c in self.symbol.chars() {
            match c {
                '%' => symbol.push_str("%25"),
                '/' => symbol.push_str("%2F"),
                '\\' => symbol.push_str("%5C"),
                c => symbol.push(c),
            }
        }
        format!("{symbol}_{}", self.interval)
    }

    /// Inverse of [`SeriesId::file_stem`].
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let (symbol, interval) = stem.rsplit_once('_')?;
        if symbol.is_empty() {
            return None;
        }
        Some(Self::new(&unescape_symbol(symbol)?, interval.parse().ok()?))
    }
}

fn unescape_symbol(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(i) = rest.find('%') {
        out.push_str(&rest[..i]);
        out.push(match rest.get(i + 1..i + 3)? {
            "25" => '%',
            "2F" => '/',
            "5C" => '\\',
            _ => return None,
        });
        rest = &rest[i + 3..];
    }
    out.push_str(rest);
    Some(out)
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// A group of intervals sharing a staleness threshold and lookback policy.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalClass {
    pub name: String,
    pub intervals: Vec<TimeFrame>,
    /// Max age of the newest bar before a refresh is due.
    pub staleness: Duration,
    /// Per-interval fetch window; intervals without an entry use the provider cap.
    pub lookback: IndexMap<TimeFrame, Lookback>,
    /// Header the cleaner looks for; `None` picks by interval.
    pub timestamp_column: Option<String>,
}

impl IntervalClass {
    /// Daily bars, refreshed once a week, full history.
    pub fn daily() -> Self {
        let day = TimeFrame::day();
        Self {
            name: "daily".into(),
            intervals: vec![day],
            staleness: Duration::days(7),
            lookback: IndexMap::from([(day, Lookback::Max)]),
            timestamp_column: None,
        }
    }

    /// Minute and hour bars, refreshed twice a day, as far back as the provider allows.
    pub fn intraday() -> Self {
        let intervals: Vec<TimeFrame> = ["1m", "5m", "15m", "30m", "90m", "1h"]
            .iter()
            .filter_map(|code| code.parse().ok())
            .collect();
        let lookback = intervals.iter().map(|tf| (*tf, lookback_cap(tf))).collect();
        Self {
            name: "intraday".into(),
            intervals,
            staleness: Duration::hours(12),
            lookback,
            timestamp_column: None,
        }
    }

    pub fn lookback_for(&self, interval: &TimeFrame) -> Lookback {
        self.lookback
            .get(interval)
            .copied()
            .unwrap_or_else(|| lookback_cap(interval))
    }

    pub fn timestamp_column_for(&self, interval: &TimeFrame) -> String {
        self.timestamp_column
            .clone()
            .unwrap_or_else(|| default_timestamp_column(interval).to_string())
    }
}

/// Everything a refresh cycle needs to know about one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPlan {
    pub id: SeriesId,
    pub class: String,
    pub lookback: Lookback,
    pub staleness: Duration,
    pub timestamp_column: String,
}

impl SeriesPlan {
    pub fn new(symbol: &str, interval: TimeFrame, class: &IntervalClass) -> Self {
        Self {
            id: SeriesId::new(symbol, interval),
            class: class.name.clone(),
            lookback: class.lookback_for(&interval),
            staleness: class.staleness,
            timestamp_column: class.timestamp_column_for(&interval),
        }
    }
}
