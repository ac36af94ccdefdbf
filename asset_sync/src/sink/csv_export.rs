//! Combined flat-file export, one file per interval kind.
//!
//! Each delivery replaces `daily_combined.csv` and `intraday_combined.csv`
//! with the rows of that delivery, so the folder always holds the latest
//! upload batch. Watermarks live next to the files in `watermarks.json`.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_data_ingestor::timestamp::{parse_timestamp, to_rfc3339};
use tempfile::NamedTempFile;

use crate::{
    identity::SeriesId,
    sink::{BarSink, Delivery, SeriesBatch},
};

pub const DAILY_FILE: &str = "daily_combined.csv";
pub const INTRADAY_FILE: &str = "intraday_combined.csv";
pub const WATERMARK_FILE: &str = "watermarks.json";

const HEADER: [&str; 8] = [
    "Date", "Ticker", "Timeframe", "Open", "High", "Low", "Close", "Volume",
];

/// File stem -> newest exported timestamp (RFC-3339).
type Watermarks = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct CsvExportSink {
    folder: PathBuf,
}

impl CsvExportSink {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn daily_path(&self) -> PathBuf {
        self.folder.join(DAILY_FILE)
    }

    pub fn intraday_path(&self) -> PathBuf {
        self.folder.join(INTRADAY_FILE)
    }

    fn watermark_path(&self) -> PathBuf {
        self.folder.join(WATERMARK_FILE)
    }

    fn load_watermarks(&self) -> anyhow::Result<Watermarks> {
        let path = self.watermark_path();
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Watermarks::new()),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    fn deliver_blocking(&self, batches: &[SeriesBatch]) -> anyhow::Result<Delivery> {
        fs::create_dir_all(&self.folder)
            .with_context(|| format!("create directory {}", self.folder.display()))?;

        let (intraday, daily): (Vec<&SeriesBatch>, Vec<&SeriesBatch>) = batches
            .iter()
            .filter(|b| !b.bars.is_empty())
            .partition(|b| b.id.interval.is_intraday());

        let mut delivery = Delivery::default();
        for (path, group) in [(self.daily_path(), &daily), (self.intraday_path(), &intraday)] {
            if group.is_empty() {
                continue;
            }
            let rows = write_combined(&path, group)?;
            tracing::debug!(path = %path.display(), rows, "combined export written");
            delivery.series += group.len();
            delivery.rows_offered += rows;
            delivery.rows_written += rows;
        }

        let mut marks = self.load_watermarks()?;
        let mut moved = false;
        for batch in daily.iter().chain(intraday.iter()) {
            let Some(newest) = batch.newest() else {
                continue;
            };
            let key = batch.id.file_stem();
            let current = marks.get(&key).and_then(|s| parse_timestamp(s));
            if current.is_none_or(|c| newest > c) {
                marks.insert(key, to_rfc3339(newest));
                moved = true;
            }
        }
        if moved {
            let json = serde_json::to_vec_pretty(&marks)?;
            write_atomic(&self.watermark_path(), &json)?;
        }
        Ok(delivery)
    }
}

/// Daily rows carry a bare date, intraday rows the full instant.
fn format_date(id: &SeriesId, ts: DateTime<Utc>) -> String {
    if id.interval.is_intraday() {
        to_rfc3339(ts)
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_combined(path: &Path, group: &[&SeriesBatch]) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    let mut rows = 0;
    for batch in group {
        let interval = batch.id.interval.to_string();
        for bar in &batch.bars {
            writer.write_record([
                format_date(&batch.id, bar.timestamp),
                batch.id.symbol.clone(),
                interval.clone(),
                cell(bar.open),
                cell(bar.high),
                cell(bar.low),
                cell(bar.close),
                cell(bar.volume),
            ])?;
            rows += 1;
        }
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush csv buffer: {}", e.error()))?;
    write_atomic(path, &bytes)?;
    Ok(rows)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl BarSink for CsvExportSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn watermark(&self, id: &SeriesId) -> anyhow::Result<Option<DateTime<Utc>>> {
        let this = self.clone();
        let key = id.file_stem();
        let marks = tokio::task::spawn_blocking(move || this.load_watermarks()).await??;
        match marks.get(&key) {
            None => Ok(None),
            Some(s) => parse_timestamp(s)
                .map(Some)
                .with_context(|| format!("watermark '{s}' for {id} is not a timestamp")),
        }
    }

    async fn deliver(&self, batches: Vec<SeriesBatch>) -> anyhow::Result<Delivery> {
        if batches.iter().all(|b| b.bars.is_empty()) {
            return Ok(Delivery::default());
        }
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.deliver_blocking(&batches)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use market_data_ingestor::models::{bar::Bar, timeframe::TimeFrame};

    fn intraday() -> TimeFrame {
        "5m".parse().unwrap()
    }

    #[tokio::test]
    async fn splits_by_interval_kind_and_tracks_watermarks() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvExportSink::new(dir.path().join("export"));

        let day = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let bar_time = Utc.with_ymd_and_hms(2024, 5, 2, 14, 30, 0).unwrap();
        let daily = SeriesBatch {
            id: SeriesId::new("aapl", TimeFrame::day()),
            bars: vec![Bar::new(day, 1.0, 2.0, 0.5, 1.5, 100.0)],
        };
        let mut five = Bar::new(bar_time, 1.0, 2.0, 0.5, 1.5, 10.0);
        five.volume = None;
        let minutes = SeriesBatch {
            id: SeriesId::new("MSFT", intraday()),
            bars: vec![five],
        };

        let delivery = sink.deliver(vec![daily, minutes]).await.unwrap();
        assert_eq!(delivery.series, 2);
        assert_eq!(delivery.rows_written, 2);

        let daily_csv = fs::read_to_string(sink.daily_path()).unwrap();
        assert_eq!(
            daily_csv,
            "Date,Ticker,Timeframe,Open,High,Low,Close,Volume\n2024-05-02,AAPL,1d,1,2,0.5,1.5,100\n"
        );
        let intraday_csv = fs::read_to_string(sink.intraday_path()).unwrap();
        assert!(intraday_csv.ends_with("2024-05-02T14:30:00Z,MSFT,5m,1,2,0.5,1.5,\n"));

        let id = SeriesId::new("MSFT", intraday());
        assert_eq!(sink.watermark(&id).await.unwrap(), Some(bar_time));
        let unknown = SeriesId::new("NVDA", TimeFrame::day());
        assert_eq!(sink.watermark(&unknown).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_delivery_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvExportSink::new(dir.path().join("export"));
        let delivery = sink.deliver(Vec::new()).await.unwrap();
        assert_eq!(delivery, Delivery::default());
        assert!(!sink.folder().exists());
    }
}
