//! Sync configuration: parsing, normalization, and loading.
//!
//! The TOML file names the symbols to track (in named groups), the interval
//! classes they are tracked at, and where results go:
//!
//! ```toml
//! base_folder = "all_ohlcv_data"
//! max_concurrency = 4
//!
//! [symbols]
//! mag7 = ["AAPL", "MSFT"]
//!
//! [classes.daily]
//! intervals = ["1d"]
//! staleness = "7d"
//! lookback = { "1d" = "max" }
//! ```
//!
//! Key behaviors:
//! - Symbols are trimmed and upper-cased; duplicates are dropped keeping the
//!   first occurrence, both within and across groups.
//! - Without a `[classes]` table the built-in `daily` and `intraday` classes
//!   apply. A class named `daily` or `intraday` inherits that class's staleness
//!   threshold when it omits one.
//! - Lookbacks are checked against what the provider serves for the interval.
//! - `BASE_FOLDER` in the environment overrides `base_folder`, and the
//!   `WRITE_DELTAS` flag overrides `[sinks].write_deltas`.
//!
//! Entrypoints: [`load_config_str`] and [`load_config_path`].

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration as StdDuration,
};

use indexmap::IndexMap;
use market_data_ingestor::{
    models::{request_params::Lookback, timeframe::TimeFrame},
    providers::yahoo_chart::params::{interval_code, lookback_cap},
};
use serde::{Deserialize, Serialize};
use shared_utils::env::{get_env_flag, get_env_opt};

use crate::{
    duration::parse_duration,
    errors::ConfigError,
    identity::{IntervalClass, SeriesPlan, normalize_symbol},
};

const BASE_FOLDER_ENV: &str = "BASE_FOLDER";
const WRITE_DELTAS_ENV: &str = "WRITE_DELTAS";

/// On-disk shape of the config file.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default = "default_base_folder")]
    pub base_folder: PathBuf,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Minimum spacing between provider calls across all tasks; 0 disables.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Group name -> symbols.
    #[serde(default)]
    pub symbols: IndexMap<String, Vec<String>>,
    /// Class name -> class settings.
    #[serde(default)]
    pub classes: IndexMap<String, ClassCfg>,
    #[serde(default)]
    pub sinks: SinksCfg,
    #[serde(default)]
    pub quality: QualityCfg,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassCfg {
    /// Interval codes such as `"1d"` or `"5m"`.
    pub intervals: Vec<String>,
    /// Duration string such as `"12h"`.
    pub staleness: Option<String>,
    /// Interval code -> `"<days>d"` or `"max"`.
    #[serde(default)]
    pub lookback: IndexMap<String, String>,
    pub timestamp_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SinksCfg {
    pub sqlite_path: Option<PathBuf>,
    pub export_folder: Option<PathBuf>,
    /// Also write the rows added by each merge under `process_data/`.
    #[serde(default = "default_true")]
    pub write_deltas: bool,
}

impl Default for SinksCfg {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            export_folder: None,
            write_deltas: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QualityCfg {
    pub report_path: Option<PathBuf>,
}

fn default_base_folder() -> PathBuf {
    PathBuf::from("all_ohlcv_data")
}

fn default_max_concurrency() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_min_request_interval_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

/// Validated, normalized configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_folder: PathBuf,
    pub max_concurrency: usize,
    pub fetch_timeout: StdDuration,
    pub min_request_interval: Option<StdDuration>,
    /// Group name -> normalized symbols; no symbol appears in two groups.
    pub symbols: IndexMap<String, Vec<String>>,
    pub classes: Vec<IntervalClass>,
    pub sinks: SinksCfg,
    pub quality: QualityCfg,
}

impl Config {
    /// Every tracked identity: each symbol at each interval of each class, in
    /// config order.
    pub fn series(&self) -> Vec<SeriesPlan> {
        self.plans_for(self.symbols.values().flatten())
    }

    /// Identities for one symbol group, or `None` if the group is unknown.
    pub fn series_in_group(&self, group: &str) -> Option<Vec<SeriesPlan>> {
        let symbols = self.symbols.get(&group.trim().to_lowercase())?;
        Some(self.plans_for(symbols.iter()))
    }

    pub fn class(&self, name: &str) -> Option<&IntervalClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Class an interval belongs to.
    pub fn class_of(&self, interval: &TimeFrame) -> Option<&IntervalClass> {
        self.classes.iter().find(|c| c.intervals.contains(interval))
    }

    fn plans_for<'a>(&self, symbols: impl Iterator<Item = &'a String>) -> Vec<SeriesPlan> {
        let symbols: Vec<&String> = symbols.collect();
        let mut plans = Vec::new();
        for class in &self.classes {
            for interval in &class.intervals {
                for symbol in &symbols {
                    plans.push(SeriesPlan::new(symbol, *interval, class));
                }
            }
        }
        plans
    }

    /// Applies `BASE_FOLDER` and `WRITE_DELTAS` from the environment when set
    /// and non-blank. An unrecognized `WRITE_DELTAS` value keeps the file's.
    pub fn apply_env_overrides(&mut self) {
        if let Some(base) = get_env_opt(BASE_FOLDER_ENV) {
            self.base_folder = PathBuf::from(base);
        }
        self.sinks.write_deltas = get_env_flag(WRITE_DELTAS_ENV, self.sinks.write_deltas);
    }
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Symbols changed by trimming or upper-casing.
    pub symbols_renamed: usize,
    /// Symbols dropped because an earlier entry (in any group) had the same name.
    pub symbols_deduped: usize,
    /// Groups left without symbols and dropped.
    pub empty_groups_dropped: usize,
}

/// Validate and normalize a parsed config file.
///
/// Errors:
/// - No symbols in any group
/// - Empty symbols after trimming
/// - Unparseable or unsupported intervals, or an interval claimed by two classes
/// - Lookbacks that are malformed or reach past what the provider serves
/// - Malformed staleness durations, or a custom class without one
/// - `max_concurrency` or `fetch_timeout_secs` of zero
pub fn normalize_config(file: ConfigFile) -> Result<(Config, NormalizationReport), ConfigError> {
    let mut report = NormalizationReport::default();

    if file.max_concurrency == 0 {
        return Err(ConfigError::Value {
            field: "max_concurrency".into(),
            message: "must be at least 1".into(),
        });
    }
    if file.fetch_timeout_secs == 0 {
        return Err(ConfigError::Value {
            field: "fetch_timeout_secs".into(),
            message: "must be at least 1".into(),
        });
    }

    // --- symbols: normalize, dedupe across groups preserving order
    let mut seen = HashSet::new();
    let mut symbols: IndexMap<String, Vec<String>> = IndexMap::new();
    for (raw_group, list) in file.symbols {
        let group = raw_group.trim().to_lowercase();
        let mut out = Vec::with_capacity(list.len());
        for raw in list {
            let symbol = normalize_symbol(&raw);
            if symbol.is_empty() {
                return Err(ConfigError::Value {
                    field: format!("symbols.{group}"),
                    message: "symbol cannot be empty after trimming".into(),
                });
            }
            if symbol != raw {
                report.symbols_renamed += 1;
            }
            if seen.insert(symbol.clone()) {
                out.push(symbol);
            } else {
                report.symbols_deduped += 1;
            }
        }
        if out.is_empty() {
            report.empty_groups_dropped += 1;
            continue;
        }
        symbols.entry(group).or_default().extend(out);
    }
    if symbols.is_empty() {
        return Err(ConfigError::Empty("the [symbols] table lists no symbols".into()));
    }

    // --- classes
    let classes = if file.classes.is_empty() {
        vec![IntervalClass::daily(), IntervalClass::intraday()]
    } else {
        let mut classes = Vec::with_capacity(file.classes.len());
        let mut claimed = HashSet::new();
        for (raw_name, cfg) in file.classes {
            let class = normalize_class(raw_name.trim().to_lowercase(), cfg)?;
            for interval in &class.intervals {
                if !claimed.insert(*interval) {
                    return Err(ConfigError::Interval {
                        class: class.name.clone(),
                        value: interval.to_string(),
                        message: "interval already belongs to another class".into(),
                    });
                }
            }
            classes.push(class);
        }
        classes
    };
    if classes.iter().all(|c| c.intervals.is_empty()) {
        return Err(ConfigError::Empty("no class lists any interval".into()));
    }

    let min_request_interval = match file.min_request_interval_ms {
        0 => None,
        ms => Some(StdDuration::from_millis(ms)),
    };

    let config = Config {
        base_folder: file.base_folder,
        max_concurrency: file.max_concurrency,
        fetch_timeout: StdDuration::from_secs(file.fetch_timeout_secs),
        min_request_interval,
        symbols,
        classes,
        sinks: file.sinks,
        quality: file.quality,
    };
    Ok((config, report))
}

fn normalize_class(name: String, cfg: ClassCfg) -> Result<IntervalClass, ConfigError> {
    let builtin = match name.as_str() {
        "daily" => Some(IntervalClass::daily()),
        "intraday" => Some(IntervalClass::intraday()),
        _ => None,
    };

    let staleness = match (&cfg.staleness, &builtin) {
        (Some(raw), _) => parse_duration(raw).map_err(|message| ConfigError::Duration {
            field: format!("classes.{name}.staleness"),
            value: raw.clone(),
            message,
        })?,
        (None, Some(b)) => b.staleness,
        (None, None) => {
            return Err(ConfigError::Value {
                field: format!("classes.{name}.staleness"),
                message: "required for custom classes".into(),
            });
        }
    };

    let mut intervals = Vec::with_capacity(cfg.intervals.len());
    for raw in &cfg.intervals {
        let interval = parse_interval(&name, raw)?;
        if !intervals.contains(&interval) {
            intervals.push(interval);
        }
    }

    let mut lookback = IndexMap::new();
    for (raw_interval, raw_lookback) in &cfg.lookback {
        let interval = parse_interval(&name, raw_interval)?;
        if !intervals.contains(&interval) {
            return Err(ConfigError::Lookback {
                class: name.clone(),
                interval: interval.to_string(),
                message: "interval is not listed in this class".into(),
            });
        }
        let value: Lookback = raw_lookback.parse().map_err(|e| ConfigError::Lookback {
            class: name.clone(),
            interval: interval.to_string(),
            message: format!("{e}"),
        })?;
        let cap = lookback_cap(&interval);
        if value.exceeds(cap) {
            return Err(ConfigError::Lookback {
                class: name.clone(),
                interval: interval.to_string(),
                message: format!("{value} exceeds the provider limit of {cap}"),
            });
        }
        lookback.insert(interval, value);
    }

    let timestamp_column = cfg
        .timestamp_column
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    Ok(IntervalClass {
        name,
        intervals,
        staleness,
        lookback,
        timestamp_column,
    })
}

fn parse_interval(class: &str, raw: &str) -> Result<TimeFrame, ConfigError> {
    let invalid = |message: String| ConfigError::Interval {
        class: class.to_string(),
        value: raw.to_string(),
        message,
    };
    let interval: TimeFrame = raw.parse().map_err(|e| invalid(format!("{e}")))?;
    interval_code(&interval).map_err(|e| invalid(format!("{e}")))?;
    Ok(interval)
}

/// Parse and normalize a config from a TOML string.
///
/// Environment overrides are not applied; see [`load_config_path`].
pub fn load_config_str(toml_str: &str) -> Result<Config, ConfigError> {
    let file: ConfigFile = toml::from_str(toml_str)?;
    let (config, report) = normalize_config(file)?;
    if report != NormalizationReport::default() {
        tracing::info!(?report, "normalized config");
    }
    Ok(config)
}

/// Read a config file from disk, parse, normalize, and apply environment
/// overrides.
pub fn load_config_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = load_config_str(&text)?;
    config.apply_env_overrides();
    Ok(config)
}
