//! Canonical in-memory representation of a time-series bar (OHLCV).
//!
//! This struct is the output of the cleaning stage and the row type of every
//! master table, regardless of which [`DataProvider`](crate::providers::DataProvider)
//! produced the raw data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single time-series bar (OHLCV) for a given timestamp.
///
/// Value fields are optional: `None` marks a cell that was missing or failed
/// numeric coercion upstream. Such bars are kept and reported, not dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// The timestamp for this bar (UTC).
    pub timestamp: DateTime<Utc>,

    /// Opening price.
    pub open: Option<f64>,

    /// Highest price during the bar interval.
    pub high: Option<f64>,

    /// Lowest price during the bar interval.
    pub low: Option<f64>,

    /// Closing price.
    pub close: Option<f64>,

    /// Volume traded during the bar interval. Never negative.
    pub volume: Option<f64>,
}

impl Bar {
    /// A bar with every value present.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }

    /// Names of the value columns that are missing on this bar.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if value.is_none() {
                out.push(name);
            }
        }
        out
    }

    pub fn has_missing(&self) -> bool {
        self.open.is_none()
            || self.high.is_none()
            || self.low.is_none()
            || self.close.is_none()
            || self.volume.is_none()
    }
}
