//! Yahoo Finance chart endpoint (`/v8/finance/chart/{symbol}`).
//!
//! The endpoint is keyless and serves a whole lookback window per call, so
//! unlike paginated vendors a single request yields the full table.

pub mod params;
pub mod provider;
pub mod response;

pub use provider::YahooChartProvider;
