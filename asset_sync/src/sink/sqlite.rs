//! SQLite sink: `bars` rows keyed by `(symbol, timeframe, ts)` with
//! insert-or-ignore semantics, plus one watermark row per identity.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use market_data_ingestor::timestamp::{parse_timestamp, to_rfc3339};

use crate::{
    db::{
        connection::connect_sqlite,
        migrate::{run_sqlite, sqlite_path},
    },
    identity::SeriesId,
    models::{NewBarRow, NewWatermark},
    schema::{bars, sink_watermark},
    sink::{BarSink, Delivery, SeriesBatch},
};

/// Rows per INSERT; eight binds each stays well under SQLite's variable limit.
const INSERT_CHUNK: usize = 1_000;

pub struct SqliteSink {
    url: String,
}

impl SqliteSink {
    /// Opens (creating if needed) the database and applies migrations.
    pub fn open(url: impl Into<String>) -> anyhow::Result<Self> {
        let url = url.into();
        let path = std::path::Path::new(sqlite_path(&url));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        run_sqlite(&url).with_context(|| format!("migrate {url}"))?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn read_watermark(
    conn: &mut SqliteConnection,
    id: &SeriesId,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    use crate::schema::sink_watermark::dsl as sw;

    let interval = id.interval.to_string();
    let raw: Option<String> = sw::sink_watermark
        .filter(sw::symbol.eq(&id.symbol))
        .filter(sw::timeframe.eq(&interval))
        .select(sw::watermark)
        .first(conn)
        .optional()?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .with_context(|| format!("stored watermark '{s}' for {id} is not a timestamp")),
    }
}

fn deliver_blocking(url: &str, batches: &[SeriesBatch]) -> anyhow::Result<Delivery> {
    let mut conn = connect_sqlite(url)?;
    conn.transaction(|conn| {
        let mut delivery = Delivery::default();
        for batch in batches {
            let Some(newest) = batch.newest() else {
                continue;
            };
            let interval = batch.id.interval.to_string();
            let rows: Vec<NewBarRow<'_>> = batch
                .bars
                .iter()
                .map(|b| NewBarRow {
                    symbol: &batch.id.symbol,
                    timeframe: &interval,
                    ts: to_rfc3339(b.timestamp),
                    open: b.open,
                    high: b.high,
                    low: b.low,
                    close: b.close,
                    volume: b.volume,
                })
                .collect();

            for chunk in rows.chunks(INSERT_CHUNK) {
                delivery.rows_written += diesel::insert_or_ignore_into(bars::table)
                    .values(chunk)
                    .execute(conn)?;
            }
            delivery.series += 1;
            delivery.rows_offered += rows.len();

            let current = read_watermark(conn, &batch.id)?;
            if current.is_none_or(|c| newest > c) {
                diesel::replace_into(sink_watermark::table)
                    .values(NewWatermark {
                        symbol: &batch.id.symbol,
                        timeframe: &interval,
                        watermark: to_rfc3339(newest),
                    })
                    .execute(conn)?;
            }
        }
        Ok(delivery)
    })
}

#[async_trait]
impl BarSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn watermark(&self, id: &SeriesId) -> anyhow::Result<Option<DateTime<Utc>>> {
        let url = self.url.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = connect_sqlite(&url)?;
            read_watermark(&mut conn, &id)
        })
        .await?
    }

    async fn deliver(&self, batches: Vec<SeriesBatch>) -> anyhow::Result<Delivery> {
        if batches.is_empty() {
            return Ok(Delivery::default());
        }
        let url = self.url.clone();
        tokio::task::spawn_blocking(move || deliver_blocking(&url, &batches)).await?
    }
}
