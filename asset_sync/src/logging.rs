//! Subscriber setup for the `asset-sync` binary.

use std::path::{Path, PathBuf};

use shared_utils::env::get_env_opt;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_DIR_ENV: &str = "ASSET_SYNC_LOG_DIR";
pub const LOG_FILE_PREFIX: &str = "asset-sync.log";

/// `ASSET_SYNC_LOG_DIR`, when set.
pub fn log_dir_from_env() -> Option<PathBuf> {
    get_env_opt(LOG_DIR_ENV).map(PathBuf::from)
}

/// Installs the global subscriber: `RUST_LOG` filter (default `info`), a
/// stderr layer, and a daily-rolling file layer under `log_dir` when given.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
pub fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}
