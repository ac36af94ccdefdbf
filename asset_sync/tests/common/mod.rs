#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use asset_sync::{
    db::{connection, migrate},
    identity::{IntervalClass, SeriesPlan},
    orchestrator::{Orchestrator, RunOptions},
    store::MasterStore,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use market_data_ingestor::{
    models::{bar::Bar, raw_table::RawTable, request_params::FetchRequest, timeframe::TimeFrame},
    providers::{ApiSnafu, DataProvider, FetchResult, ProviderError},
};
use tempfile::TempDir;

// ---------------------------------------------------------------- fixtures

/// Midnight UTC on day `d` of January 2024.
pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

/// A complete bar whose close encodes the day, offset by `tag`.
pub fn bar(d: u32, tag: f64) -> Bar {
    let close = 100.0 + d as f64 + tag;
    Bar::new(day(d), close - 0.5, close + 1.0, close - 1.0, close, 1_000.0)
}

pub fn bars(days: std::ops::RangeInclusive<u32>, tag: f64) -> Vec<Bar> {
    days.map(|d| bar(d, tag)).collect()
}

/// The daily table shape the chart provider emits for `bars`.
pub fn raw_daily(bars: &[Bar]) -> RawTable {
    let cell = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    RawTable::new(
        ["Date", "Open", "High", "Low", "Close", "Volume"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        bars.iter()
            .map(|b| {
                vec![
                    b.timestamp.format("%Y-%m-%d").to_string(),
                    cell(b.open),
                    cell(b.high),
                    cell(b.low),
                    cell(b.close),
                    cell(b.volume),
                ]
            })
            .collect(),
    )
}

pub fn daily_plan(symbol: &str) -> SeriesPlan {
    SeriesPlan::new(symbol, TimeFrame::day(), &IntervalClass::daily())
}

/// A store rooted in a fresh temp dir; keep the dir alive for the test.
pub fn temp_store() -> (TempDir, MasterStore) {
    let dir = TempDir::new().expect("tempdir");
    let store = MasterStore::new(dir.path().join("data"));
    (dir, store)
}

pub fn orchestrator(provider: Arc<dyn DataProvider>, store: &MasterStore) -> Orchestrator {
    Orchestrator::new(
        provider,
        store.clone(),
        RunOptions {
            max_concurrency: 4,
            fetch_timeout: Duration::from_secs(5),
            write_deltas: true,
        },
    )
}

// ---------------------------------------------------------------- providers

/// What the scripted provider does for one symbol.
#[derive(Clone)]
pub enum Script {
    Table(RawTable),
    NoData,
    Fail,
    /// Sleep, then behave like the inner script.
    Delay(Duration, Box<Script>),
}

/// In-memory provider answering from a per-symbol script. Unscripted symbols
/// get `NoData`. Tracks call counts and peak concurrency.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Script>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, symbol: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), script);
    }

    pub fn serve(&self, symbol: &str, bars: &[Bar]) {
        self.set(symbol, Script::Table(raw_daily(bars)));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn play(script: Script) -> Result<FetchResult, ProviderError> {
        let mut script = script;
        loop {
            match script {
                Script::Table(table) => return Ok(FetchResult::from_table(table)),
                Script::NoData => return Ok(FetchResult::NoData),
                Script::Fail => {
                    return ApiSnafu {
                        status: 503u16,
                        message: "Service Unavailable",
                    }
                    .fail();
                }
                Script::Delay(wait, inner) => {
                    tokio::time::sleep(wait).await;
                    script = *inner;
                }
            }
        }
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.symbol)
            .cloned()
            .unwrap_or(Script::NoData);
        let result = Self::play(script).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------- sqlite

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("test.db").to_string_lossy().to_string();

    migrate::run_sqlite(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}
