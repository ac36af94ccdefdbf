//! Downstream delivery of master-table rows.
//!
//! A sink keeps a watermark per identity: the newest timestamp it is known to
//! have received. [`export`] offers each sink only the rows newer than that
//! watermark. Delivery is at-least-once: a sink writes first and advances the
//! watermark only after the write succeeded, and tolerates receiving rows it
//! already has.

pub mod csv_export;
pub mod sqlite;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_data_ingestor::models::bar::Bar;

use crate::{identity::SeriesId, store::MasterStore};

pub use csv_export::CsvExportSink;
pub use sqlite::SqliteSink;

/// New rows of one identity, sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBatch {
    pub id: SeriesId,
    pub bars: Vec<Bar>,
}

impl SeriesBatch {
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.bars.iter().map(|b| b.timestamp).max()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Identities with at least one row offered.
    pub series: usize,
    pub rows_offered: usize,
    /// Rows the sink did not already have.
    pub rows_written: usize,
    /// Identities whose master table could not be read; nothing was offered.
    pub skipped: usize,
}

#[async_trait]
pub trait BarSink: Send + Sync {
    fn name(&self) -> &str;

    async fn watermark(&self, id: &SeriesId) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Writes `batches`, then moves each identity's watermark up to its newest
    /// delivered bar. A watermark never moves backwards.
    async fn deliver(&self, batches: Vec<SeriesBatch>) -> anyhow::Result<Delivery>;
}

/// Offers `sink` every row of `ids` newer than the sink's watermark.
///
/// An unreadable master table is logged and counted in [`Delivery::skipped`];
/// the other identities are still delivered. Sink failures abort the export.
pub async fn export(
    sink: &dyn BarSink,
    store: &MasterStore,
    ids: &[SeriesId],
) -> anyhow::Result<Delivery> {
    let mut batches = Vec::new();
    let mut skipped = 0;
    for id in ids {
        let read = {
            let store = store.clone();
            let owned = id.clone();
            tokio::task::spawn_blocking(move || store.read(&owned)).await?
        };
        let table = match read {
            Ok(Some(table)) => table,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(sink = sink.name(), series = %id, error = %e, "skipping unreadable master table");
                skipped += 1;
                continue;
            }
        };
        let watermark = sink
            .watermark(id)
            .await
            .with_context(|| format!("{}: read watermark for {id}", sink.name()))?;
        let bars = table.newer_than(watermark).to_vec();
        tracing::debug!(sink = sink.name(), series = %id, ?watermark, rows = bars.len(), "export candidates");
        if !bars.is_empty() {
            batches.push(SeriesBatch { id: id.clone(), bars });
        }
    }

    let mut delivery = sink
        .deliver(batches)
        .await
        .with_context(|| format!("{}: deliver", sink.name()))?;
    delivery.skipped = skipped;
    tracing::info!(
        sink = sink.name(),
        series = delivery.series,
        offered = delivery.rows_offered,
        written = delivery.rows_written,
        skipped,
        "export finished"
    );
    Ok(delivery)
}
