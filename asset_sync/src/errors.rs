//! Error types for the sync pipeline.
//!
//! Per-identity failures ([`SyncError`]) are recorded in the run summary and
//! never stop other identities. [`ConfigError`] is fatal and raised before any
//! fetch starts.

use std::{path::PathBuf, time::Duration};

use market_data_ingestor::providers::ProviderError;
use thiserror::Error;

/// Reading or writing a master table or delta file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} line {line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("failed to replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

/// Why one identity's cycle did not complete.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network, API or rate-limit failure reported by the provider.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("fetch timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The identity's task panicked or was cancelled.
    #[error("task failed: {0}")]
    Join(String),
}

impl SyncError {
    /// Failures worth retrying on the next cycle without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Provider(e) => e.is_transient(),
            SyncError::Timeout(_) => true,
            SyncError::Storage(_) | SyncError::Join(_) => false,
        }
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Join(err.to_string())
    }
}

/// Invalid configuration; nothing has been fetched when this is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no series configured: {0}")]
    Empty(String),

    #[error("invalid interval '{value}' in class '{class}': {message}")]
    Interval {
        class: String,
        value: String,
        message: String,
    },

    #[error("invalid lookback for {interval} in class '{class}': {message}")]
    Lookback {
        class: String,
        interval: String,
        message: String,
    },

    #[error("invalid duration '{value}' for {field}: {message}")]
    Duration {
        field: String,
        value: String,
        message: String,
    },

    #[error("invalid value for {field}: {message}")]
    Value { field: String, message: String },
}
