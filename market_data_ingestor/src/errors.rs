use thiserror::Error;

use crate::{
    models::timeframe::TimeFrameError,
    providers::{ProviderError, ProviderInitError},
};

/// The unified error type for the `market_data_ingestor` crate.
#[derive(Debug, Error)]
pub enum Error {
    /// An error originating from a data provider (e.g., API error, validation).
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider could not be constructed.
    #[error("Provider initialization error: {0}")]
    ProviderInit(#[from] ProviderInitError),

    /// An interval or lookback string failed to parse.
    #[error("Invalid request: {0}")]
    Request(#[from] TimeFrameError),

    /// Reading or writing a CSV table failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A generic I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
