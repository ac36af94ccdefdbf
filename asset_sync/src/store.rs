//! File-backed master tables.
//!
//! Layout under the base folder:
//! - `transf_data/<SYMBOL>_<interval>.csv`: the master table of each identity
//! - `process_data/<SYMBOL>_<interval>.csv`: rows added by the latest merge
//!
//! Files have the header `timestamp,open,high,low,close,volume`, RFC-3339 UTC
//! timestamps and empty cells for missing values. Every write goes to a temp
//! file in the target directory and is renamed over the target, so readers see
//! either the old or the new table, never a partial one.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use market_data_ingestor::{
    models::bar::Bar,
    timestamp::{parse_timestamp, to_rfc3339},
};
use tempfile::NamedTempFile;

use crate::{errors::StoreError, identity::SeriesId, table::MasterTable};

pub const MASTER_DIR: &str = "transf_data";
pub const DELTA_DIR: &str = "process_data";
pub const HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

#[derive(Debug, Clone)]
pub struct MasterStore {
    base: PathBuf,
}

impl MasterStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn master_dir(&self) -> PathBuf {
        self.base.join(MASTER_DIR)
    }

    pub fn delta_dir(&self) -> PathBuf {
        self.base.join(DELTA_DIR)
    }

    pub fn master_path(&self, id: &SeriesId) -> PathBuf {
        self.master_dir().join(format!("{}.csv", id.file_stem()))
    }

    pub fn delta_path(&self, id: &SeriesId) -> PathBuf {
        self.delta_dir().join(format!("{}.csv", id.file_stem()))
    }

    /// The master table, or `None` if the identity has none yet.
    pub fn read(&self, id: &SeriesId) -> Result<Option<MasterTable>, StoreError> {
        Ok(self.read_rows(id)?.map(MasterTable::from_bars))
    }

    /// Rows exactly as stored, without sorting or deduplication.
    pub fn read_rows(&self, id: &SeriesId) -> Result<Option<Vec<Bar>>, StoreError> {
        let path = self.master_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_bars(&path).map(Some)
    }

    pub fn write(&self, id: &SeriesId, table: &MasterTable) -> Result<PathBuf, StoreError> {
        let path = self.master_path(id);
        write_bars_atomic(&path, table.bars())?;
        Ok(path)
    }

    /// Replaces the identity's delta file with `bars`.
    pub fn write_delta(&self, id: &SeriesId, bars: &[Bar]) -> Result<PathBuf, StoreError> {
        let path = self.delta_path(id);
        write_bars_atomic(&path, bars)?;
        Ok(path)
    }

    /// Identities with a master table on disk, sorted.
    pub fn list(&self) -> Result<Vec<SeriesId>, StoreError> {
        let dir = self.master_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).and_then(SeriesId::from_file_stem) {
                Some(id) => ids.push(id),
                None => tracing::debug!(path = %path.display(), "skipping unrecognized file"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn read_bars(path: &Path) -> Result<Vec<Bar>, StoreError> {
    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = rdr.headers().map_err(csv_err)?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
    let Some(ts_idx) = position(HEADER[0]) else {
        return Err(StoreError::Malformed {
            path: path.to_path_buf(),
            line: 1,
            message: "missing timestamp column".into(),
        });
    };
    let value_idx: Vec<Option<usize>> = HEADER[1..].iter().map(|h| position(h)).collect();

    let mut bars = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let malformed = |message: String| StoreError::Malformed {
            path: path.to_path_buf(),
            line,
            message,
        };

        let raw_ts = record.get(ts_idx).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| malformed(format!("unparseable timestamp '{raw_ts}'")))?;

        let mut values = [None; 5];
        for (slot, idx) in values.iter_mut().zip(&value_idx) {
            let cell = idx.and_then(|i| record.get(i)).unwrap_or_default().trim();
            if cell.is_empty() {
                continue;
            }
            let v: f64 = cell
                .parse()
                .map_err(|_| malformed(format!("non-numeric value '{cell}'")))?;
            *slot = Some(v).filter(|v| v.is_finite());
        }
        let [open, high, low, close, volume] = values;
        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }
    Ok(bars)
}

fn render(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_bars_atomic(path: &Path, bars: &[Bar]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut wtr = csv::Writer::from_writer(tmp.as_file_mut());
        wtr.write_record(HEADER).map_err(|source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        for bar in bars {
            wtr.write_record([
                to_rfc3339(bar.timestamp),
                render(bar.open),
                render(bar.high),
                render(bar.low),
                render(bar.close),
                render(bar.volume),
            ])
            .map_err(|source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        }
        wtr.flush().map_err(io_err)?;
    }
    tmp.as_file_mut().flush().map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
