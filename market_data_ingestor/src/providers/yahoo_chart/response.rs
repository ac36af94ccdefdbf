use chrono::{DateTime, Duration};
use serde::Deserialize;

use crate::{models::raw_table::RawTable, timestamp::to_rfc3339};

pub const VALUE_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

#[derive(Debug, Deserialize)]
pub struct ChartEnvelope {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
pub struct ChartError {
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(default)]
    pub indicators: Indicators,
}

#[derive(Debug, Deserialize)]
pub struct ChartMeta {
    pub symbol: Option<String>,
    /// Exchange offset from UTC in seconds; daily bars are dated in exchange time.
    #[serde(default)]
    pub gmtoffset: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<Quote>,
    #[serde(default)]
    pub adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdjClose {
    #[serde(default)]
    pub adjclose: Vec<Option<f64>>,
}

fn cell(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

fn render(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl ChartResult {
    /// Flattens the columnar payload into a [`RawTable`].
    ///
    /// Intraday results get a `Datetime` column of UTC instants; daily and
    /// coarser results get a `Date` column in exchange-local calendar days.
    /// Rows with every value null are skipped, single nulls become empty cells.
    /// With `auto_adjust`, prices are scaled by `adjclose / close` where both
    /// are known.
    pub fn into_raw_table(self, intraday: bool, auto_adjust: bool) -> RawTable {
        let time_header = if intraday { "Datetime" } else { "Date" };
        let mut headers = vec![time_header.to_string()];
        headers.extend(VALUE_COLUMNS.iter().map(|c| c.to_string()));

        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();
        let adjclose = self
            .indicators
            .adjclose
            .into_iter()
            .next()
            .map(|a| a.adjclose)
            .unwrap_or_default();
        let offset = Duration::seconds(self.meta.gmtoffset);

        let mut rows = Vec::with_capacity(self.timestamp.len());
        for (i, &epoch) in self.timestamp.iter().enumerate() {
            let Some(ts) = DateTime::from_timestamp(epoch, 0) else {
                continue;
            };
            let mut open = cell(&quote.open, i);
            let mut high = cell(&quote.high, i);
            let mut low = cell(&quote.low, i);
            let mut close = cell(&quote.close, i);
            let volume = cell(&quote.volume, i);

            if [open, high, low, close, volume].iter().all(Option::is_none) {
                continue;
            }

            if auto_adjust {
                if let (Some(adj), Some(raw)) = (cell(&adjclose, i), close) {
                    if raw != 0.0 {
                        let ratio = adj / raw;
                        open = open.map(|v| v * ratio);
                        high = high.map(|v| v * ratio);
                        low = low.map(|v| v * ratio);
                        close = Some(adj);
                    }
                }
            }

            let stamp = if intraday {
                to_rfc3339(ts)
            } else {
                (ts + offset).format("%Y-%m-%d").to_string()
            };
            rows.push(vec![
                stamp,
                render(open),
                render(high),
                render(low),
                render(close),
                render(volume),
            ]);
        }
        RawTable::new(headers, rows)
    }
}
