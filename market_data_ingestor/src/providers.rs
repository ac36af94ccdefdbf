//! Provider abstraction for market data sources.
//!
//! This module defines the [`DataProvider`] trait, which serves as a unified interface
//! for fetching raw bar tables from any market data vendor.
//!
//! Each concrete provider implementation (such as [`yahoo_chart::YahooChartProvider`])
//! implements [`DataProvider`] to handle vendor-specific API logic and validation.
//! [`throttle::Throttle`] spaces calls to any provider with a shared rate limiter.
//!
//! The trait is designed for async usage and supports dynamic dispatch (`dyn DataProvider`)
//! for runtime selection of providers.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_data_ingestor::models::request_params::FetchRequest;
//! use market_data_ingestor::providers::{DataProvider, FetchResult, ProviderError};
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl DataProvider for MyProvider {
//!     async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResult, ProviderError> {
//!         Ok(FetchResult::NoData)
//!     }
//! }
//! ```

pub mod throttle;
pub mod yahoo_chart;

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};

use crate::models::{raw_table::RawTable, request_params::FetchRequest};

/// What a provider returned for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// A non-empty raw table: timestamp-like first column plus OHLCV columns.
    Data(RawTable),
    /// The provider answered but had nothing for this symbol and window.
    NoData,
}

impl FetchResult {
    /// Folds an empty table into [`FetchResult::NoData`].
    pub fn from_table(table: RawTable) -> Self {
        if table.is_empty() {
            FetchResult::NoData
        } else {
            FetchResult::Data(table)
        }
    }
}

/// Trait for fetching raw bar tables from a market data provider.
///
/// Implementations must not panic on network or vendor failures; those are
/// returned as [`ProviderError`] so callers can skip the series and carry on.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetches one series over the request's lookback window.
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult::Data(_))` - A non-empty raw table.
    /// * `Ok(FetchResult::NoData)` - The provider has nothing for this request.
    /// * `Err(ProviderError)` - The request failed or was rejected.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError>;
}

#[async_trait]
impl<P: DataProvider + ?Sized> DataProvider for std::sync::Arc<P> {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError> {
        (**self).fetch(request).await
    }
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// A default header value contains invalid characters.
    #[snafu(display("Invalid header value: {source}"))]
    InvalidHeader {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },

    /// The throttle was configured with a zero period.
    #[snafu(display("Request interval must be greater than zero"))]
    ZeroInterval { backtrace: Backtrace },
}

/// Errors that can occur within a `DataProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider's API returned an error status or error payload.
    #[snafu(display("API error ({status}): {message}"))]
    Api {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific provider.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },

    /// An internal error occurred while processing data within the provider.
    #[snafu(display("Internal provider error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}

impl ProviderError {
    /// Rate limiting and server-side failures; worth retrying on a later cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Reqwest { .. } => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
