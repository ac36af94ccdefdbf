//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::bars`]: delivered bars keyed by `(symbol, timeframe, ts)`
//! - [`crate::schema::sink_watermark`]: newest delivered timestamp per series
//!
//! Timestamps are stored as RFC-3339 UTC text.

use diesel::prelude::*;

use crate::schema::*;

/// A row in [`crate::schema::bars`].
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = bars, check_for_backend(diesel::sqlite::Sqlite))]
pub struct BarRow {
    pub symbol: String,
    /// Interval code such as `"1d"` or `"5m"`.
    pub timeframe: String,
    pub ts: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Insertable form of [`BarRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bars)]
pub struct NewBarRow<'a> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub ts: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// A row in [`crate::schema::sink_watermark`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sink_watermark, check_for_backend(diesel::sqlite::Sqlite))]
pub struct WatermarkRow {
    pub symbol: String,
    pub timeframe: String,
    pub watermark: String,
    /// Maintained by the database default on insert/replace.
    pub updated_at: String,
}

/// Insertable form of [`WatermarkRow`]; `updated_at` takes its default.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sink_watermark)]
pub struct NewWatermark<'a> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub watermark: String,
}
