//! Incremental OHLCV sync: keeps one master table per `(symbol, interval)`
//! fresh from the chart provider, and exports new rows to downstream sinks.
//!
//! Entry points are [`config::load_config_path`] and
//! [`orchestrator::Orchestrator::run`]; [`sink::export`] and
//! [`quality::check_store`] work over the tables the orchestrator maintains.

pub mod config;
pub mod db;
pub mod duration;
pub mod errors;
pub mod freshness;
pub mod identity;
pub mod locks;
pub mod logging;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod quality;
pub mod schema;
pub mod sink;
pub mod store;
pub mod table;
