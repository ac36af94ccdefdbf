//! Runs refresh cycles for many identities.
//!
//! Per identity: lock → read master → freshness → wait for the shared throttle
//! → fetch (with a timeout) → clean → merge → atomic write. Identities run concurrently up to
//! `max_concurrency`; a failure is recorded in that identity's report and the
//! batch carries on.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use market_data_ingestor::{
    clean::{Cleaned, clean},
    models::request_params::FetchRequest,
    providers::{
        DataProvider, FetchResult, ProviderInitError, throttle::Throttle,
        yahoo_chart::YahooChartProvider,
    },
};
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::Instrument;

use crate::{
    config::Config,
    errors::SyncError,
    freshness::assess,
    identity::{SeriesId, SeriesPlan},
    locks::IdentityLocks,
    merge::{MergeOutcome, merge},
    store::MasterStore,
};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_concurrency: usize,
    pub fetch_timeout: Duration,
    pub write_deltas: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            fetch_timeout: Duration::from_secs(30),
            write_deltas: true,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            fetch_timeout: config.fetch_timeout,
            write_deltas: config.sinks.write_deltas,
        }
    }
}

/// Result of one identity's cycle.
#[derive(Debug)]
pub enum Outcome {
    /// Master table is within its staleness threshold; nothing fetched.
    Fresh,
    /// First master table written.
    Created { rows: usize },
    Appended { added: usize, total: usize },
    /// Fetched, but every row was already in the master table.
    NoNewRows,
    /// Provider had nothing and there is no master table.
    NoData,
    Failed(SyncError),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn rows_added(&self) -> usize {
        match self {
            Outcome::Created { rows } => *rows,
            Outcome::Appended { added, .. } => *added,
            _ => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Fresh => f.write_str("fresh"),
            Outcome::Created { rows } => write!(f, "created ({rows} rows)"),
            Outcome::Appended { added, total } => write!(f, "appended {added} ({total} rows)"),
            Outcome::NoNewRows => f.write_str("no new rows"),
            Outcome::NoData => f.write_str("no data"),
            Outcome::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

#[derive(Debug)]
pub struct IdentityReport {
    pub id: SeriesId,
    pub outcome: Outcome,
}

/// One report per planned identity, in plan order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<IdentityReport>,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn fresh(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Fresh))
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Created { .. }))
    }

    pub fn appended(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Appended { .. }))
    }

    pub fn no_new_rows(&self) -> usize {
        self.count(|o| matches!(o, Outcome::NoNewRows))
    }

    pub fn no_data(&self) -> usize {
        self.count(|o| matches!(o, Outcome::NoData))
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::is_failure)
    }

    pub fn rows_added(&self) -> usize {
        self.reports.iter().map(|r| r.outcome.rows_added()).sum()
    }

    pub fn get(&self, id: &SeriesId) -> Option<&Outcome> {
        self.reports.iter().find(|r| &r.id == id).map(|r| &r.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &IdentityReport> {
        self.reports.iter().filter(|r| r.outcome.is_failure())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} series: {} fresh, {} created, {} appended (+{} rows), {} unchanged, {} no data, {} failed",
            self.reports.len(),
            self.fresh(),
            self.created(),
            self.appended(),
            self.rows_added(),
            self.no_new_rows(),
            self.no_data(),
            self.failed()
        )
    }
}

pub fn default_provider() -> Result<Arc<dyn DataProvider>, ProviderInitError> {
    Ok(Arc::new(YahooChartProvider::new()?))
}

#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn DataProvider>,
    store: MasterStore,
    locks: Arc<IdentityLocks>,
    throttle: Option<Throttle>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn DataProvider>, store: MasterStore, options: RunOptions) -> Self {
        Self {
            provider,
            store,
            locks: Arc::new(IdentityLocks::new()),
            throttle: None,
            options,
        }
    }

    /// Store, options and throttle as configured.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn DataProvider>,
    ) -> Result<Self, ProviderInitError> {
        let orchestrator = Self::new(
            provider,
            MasterStore::new(&config.base_folder),
            RunOptions::from_config(config),
        );
        Ok(match config.min_request_interval {
            Some(interval) => orchestrator.with_throttle(Throttle::new(interval)?),
            None => orchestrator,
        })
    }

    /// Space provider calls across all identities. The wait for a permit is
    /// not counted against `fetch_timeout`.
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Share a lock registry with other orchestrators over the same store.
    pub fn with_locks(mut self, locks: Arc<IdentityLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &MasterStore {
        &self.store
    }

    /// Runs every plan and reports each outcome. Never fails as a whole.
    pub async fn run(&self, plans: Vec<SeriesPlan>, now: DateTime<Utc>) -> RunSummary {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        tracing::info!(
            series = plans.len(),
            max_concurrency = self.options.max_concurrency,
            "starting refresh run"
        );

        let handles: Vec<(SeriesId, JoinHandle<Outcome>)> = plans
            .into_iter()
            .map(|plan| {
                let this = self.clone();
                let semaphore = Arc::clone(&semaphore);
                let id = plan.id.clone();
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed.
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Outcome::Failed(SyncError::Join("semaphore closed".into()));
                    };
                    this.sync_series(&plan, now).await
                });
                (id, handle)
            })
            .collect();

        let mut summary = RunSummary::default();
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(series = %id, error = %e, "series task failed");
                    Outcome::Failed(e.into())
                }
            };
            summary.reports.push(IdentityReport { id, outcome });
        }

        tracing::info!(%summary, "refresh run finished");
        summary
    }

    /// One full cycle for one identity, under its lock.
    pub async fn sync_series(&self, plan: &SeriesPlan, now: DateTime<Utc>) -> Outcome {
        let span = tracing::info_span!("series", id = %plan.id, class = %plan.class);
        async {
            match self.try_sync(plan, now).await {
                Ok(outcome) => {
                    tracing::debug!(%outcome, "series done");
                    outcome
                }
                Err(e) => {
                    tracing::warn!(error = %e, transient = e.is_transient(), "series failed");
                    Outcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_sync(&self, plan: &SeriesPlan, now: DateTime<Utc>) -> Result<Outcome, SyncError> {
        let _guard = self.locks.lock(&plan.id).await;

        let existing = {
            let store = self.store.clone();
            let id = plan.id.clone();
            tokio::task::spawn_blocking(move || store.read(&id)).await??
        };

        let freshness = assess(existing.as_ref(), now, plan.staleness);
        if !freshness.needs_refresh() {
            tracing::debug!(%freshness, "skipping");
            return Ok(Outcome::Fresh);
        }
        tracing::info!(%freshness, lookback = %plan.lookback, "refreshing");

        let request = FetchRequest::new(plan.id.symbol.clone(), plan.id.interval, plan.lookback);
        if let Some(throttle) = &self.throttle {
            throttle.ready().await;
        }
        let timeout = self.options.fetch_timeout;
        let fetched = tokio::time::timeout(timeout, self.provider.fetch(&request))
            .await
            .map_err(|_| SyncError::Timeout(timeout))??;

        let raw = match fetched {
            FetchResult::Data(raw) => raw,
            FetchResult::NoData if existing.is_none() => {
                tracing::warn!("provider returned no data");
                return Ok(Outcome::NoData);
            }
            FetchResult::NoData => {
                tracing::warn!("provider returned no data; keeping existing table");
                return Ok(Outcome::NoNewRows);
            }
        };

        let fetched_rows = raw.len();
        let Cleaned { bars, report } = clean(raw, &plan.id.symbol, &plan.timestamp_column);
        if report.header_recovered || report.dropped_rows() > 0 {
            tracing::info!(
                fetched_rows,
                header_recovered = report.header_recovered,
                symbol_rows_dropped = report.symbol_rows_dropped,
                unparseable_timestamps = report.unparseable_timestamps,
                duplicate_timestamps = report.duplicate_timestamps,
                "cleaned fetched table"
            );
        }
        if let Some(first) = report.missing_value_rows.first() {
            tracing::warn!(
                rows = report.missing_value_rows.len(),
                first = %first.timestamp,
                columns = ?first.columns,
                "rows with missing values kept"
            );
        }

        let had_master = existing.is_some();
        let outcome = merge(existing.as_ref(), bars);
        drop(existing);

        let (table, new_rows) = match outcome {
            MergeOutcome::Unchanged if had_master => return Ok(Outcome::NoNewRows),
            MergeOutcome::Unchanged => return Ok(Outcome::NoData),
            MergeOutcome::Created { table } => {
                let rows = table.bars().to_vec();
                (table, rows)
            }
            MergeOutcome::Appended { table, added } => (table, added),
        };
        let total = table.len();
        let added = new_rows.len();

        let store = self.store.clone();
        let id = plan.id.clone();
        let write_deltas = self.options.write_deltas;
        tokio::task::spawn_blocking(move || {
            let path = store.write(&id, &table)?;
            tracing::debug!(path = %path.display(), rows = total, "master table written");
            if write_deltas {
                // Deltas are a convenience copy; the master is already durable.
                if let Err(e) = store.write_delta(&id, &new_rows) {
                    tracing::warn!(error = %e, "failed to write delta file");
                }
            }
            Ok::<_, SyncError>(())
        })
        .await??;

        if had_master {
            tracing::info!(added, total, "appended rows");
            Ok(Outcome::Appended { added, total })
        } else {
            tracing::info!(rows = total, "created master table");
            Ok(Outcome::Created { rows: total })
        }
    }
}
