//! Quality checks over stored master tables and the JSON report they produce.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use market_data_ingestor::models::{bar::Bar, timeframe::TimeFrameUnit};
use serde::Serialize;

use crate::{identity::SeriesId, store::MasterStore};

/// Absolute z-score above which a close-to-close return is an outlier.
pub const OUTLIER_Z: f64 = 3.0;
/// Daily bars further apart than this are a gap (covers long weekends).
pub const DAILY_GAP_DAYS: i64 = 3;
/// Other intervals: a gap is a step longer than this many median steps.
pub const MEDIAN_GAP_FACTOR: i32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Issue {
    EmptyData,
    /// Column name -> rows missing that value.
    MissingValues { columns: BTreeMap<&'static str, usize> },
    DuplicateTimestamps { count: usize },
    PriceInconsistency {
        high_below_low: usize,
        close_outside_range: usize,
        open_outside_range: usize,
    },
    /// Zero or negative volume.
    VolumeAnomaly { rows: usize },
    OutlierDetection { count: usize },
    TimeGaps { count: usize, threshold_secs: i64 },
    ProcessingError { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesQuality {
    pub id: SeriesId,
    pub records: usize,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub total_series: usize,
    pub total_records: usize,
    pub series_with_issues: usize,
    pub anomalies_detected: usize,
    pub series: Vec<SeriesQuality>,
}

impl QualityReport {
    pub fn new(series: Vec<SeriesQuality>, generated_at: DateTime<Utc>) -> Self {
        let with_issues: Vec<&SeriesQuality> =
            series.iter().filter(|s| !s.issues.is_empty()).collect();
        Self {
            generated_at,
            total_series: series.len(),
            total_records: series.iter().map(|s| s.records).sum(),
            series_with_issues: with_issues.len(),
            anomalies_detected: with_issues.iter().map(|s| s.issues.len()).sum(),
            series,
        }
    }

    /// `quality_report_YYYYmmdd_HHMMSS.json`
    pub fn file_name(&self) -> String {
        format!(
            "quality_report_{}.json",
            self.generated_at.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Runs every check over `bars` as stored (any order, duplicates included).
pub fn check_bars(id: &SeriesId, bars: &[Bar]) -> Vec<Issue> {
    if bars.is_empty() {
        return vec![Issue::EmptyData];
    }
    let mut issues = Vec::new();

    let mut missing = BTreeMap::new();
    for bar in bars {
        for column in bar.missing_columns() {
            *missing.entry(column).or_insert(0) += 1;
        }
    }
    if !missing.is_empty() {
        issues.push(Issue::MissingValues { columns: missing });
    }

    let mut seen = HashSet::with_capacity(bars.len());
    let duplicates = bars.iter().filter(|b| !seen.insert(b.timestamp)).count();
    if duplicates > 0 {
        issues.push(Issue::DuplicateTimestamps { count: duplicates });
    }

    let (mut high_below_low, mut close_outside_range, mut open_outside_range) = (0, 0, 0);
    for bar in bars {
        let (Some(high), Some(low)) = (bar.high, bar.low) else {
            continue;
        };
        let outside = |v: Option<f64>| v.is_some_and(|v| v > high || v < low);
        high_below_low += usize::from(high < low);
        close_outside_range += usize::from(outside(bar.close));
        open_outside_range += usize::from(outside(bar.open));
    }
    if high_below_low + close_outside_range + open_outside_range > 0 {
        issues.push(Issue::PriceInconsistency {
            high_below_low,
            close_outside_range,
            open_outside_range,
        });
    }

    let non_positive = bars
        .iter()
        .filter(|b| b.volume.is_some_and(|v| v <= 0.0))
        .count();
    if non_positive > 0 {
        issues.push(Issue::VolumeAnomaly { rows: non_positive });
    }

    let mut sorted: Vec<&Bar> = bars.iter().collect();
    sorted.sort_by_key(|b| b.timestamp);

    let outliers = return_outliers(&sorted);
    if outliers > 0 {
        issues.push(Issue::OutlierDetection { count: outliers });
    }

    if let Some((count, threshold)) = time_gaps(id, &sorted) {
        issues.push(Issue::TimeGaps {
            count,
            threshold_secs: threshold.num_seconds(),
        });
    }

    issues
}

/// Close-to-close returns whose |z| exceeds [`OUTLIER_Z`].
fn return_outliers(sorted: &[&Bar]) -> usize {
    let returns: Vec<f64> = sorted
        .windows(2)
        .filter_map(|w| match (w[0].close, w[1].close) {
            (Some(prev), Some(next)) if prev != 0.0 => Some((next - prev) / prev),
            _ => None,
        })
        .collect();
    if returns.len() < 2 {
        return 0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 || !std.is_finite() {
        return 0;
    }
    returns
        .iter()
        .filter(|r| ((*r - mean) / std).abs() > OUTLIER_Z)
        .count()
}

/// Number of oversized steps and the threshold used, when any exist.
fn time_gaps(id: &SeriesId, sorted: &[&Bar]) -> Option<(usize, Duration)> {
    let mut steps: Vec<Duration> = sorted
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .collect();
    if steps.is_empty() {
        return None;
    }

    let threshold = if id.interval.unit == TimeFrameUnit::Day {
        Duration::days(DAILY_GAP_DAYS)
    } else {
        steps.sort();
        let mid = steps.len() / 2;
        let median = if steps.len() % 2 == 0 {
            (steps[mid - 1] + steps[mid]) / 2
        } else {
            steps[mid]
        };
        median * MEDIAN_GAP_FACTOR
    };

    let count = steps.iter().filter(|s| **s > threshold).count();
    (count > 0).then_some((count, threshold))
}

/// Checks every master table in `store`. A table that cannot be read is
/// reported as a processing error for that identity.
pub fn check_store(store: &MasterStore, now: DateTime<Utc>) -> anyhow::Result<QualityReport> {
    let ids = store.list().context("list master tables")?;
    let mut series = Vec::with_capacity(ids.len());
    for id in ids {
        let entry = match store.read_rows(&id) {
            Ok(rows) => {
                let bars = rows.unwrap_or_default();
                let issues = check_bars(&id, &bars);
                SeriesQuality {
                    id,
                    records: bars.len(),
                    issues,
                }
            }
            Err(e) => {
                tracing::error!(series = %id, error = %e, "quality check could not read table");
                SeriesQuality {
                    id,
                    records: 0,
                    issues: vec![Issue::ProcessingError {
                        message: e.to_string(),
                    }],
                }
            }
        };
        if !entry.issues.is_empty() {
            tracing::warn!(series = %entry.id, issues = entry.issues.len(), "quality issues found");
        }
        series.push(entry);
    }

    let report = QualityReport::new(series, now);
    tracing::info!(
        series = report.total_series,
        with_issues = report.series_with_issues,
        "quality checks completed"
    );
    Ok(report)
}

/// Writes `report` as pretty JSON under `dir`, creating it if needed.
pub fn write_report(dir: &Path, report: &QualityReport) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let path = dir.join(report.file_name());
    let json = serde_json::to_vec_pretty(report)?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), "quality report saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use market_data_ingestor::models::timeframe::TimeFrame;
    use serde_json::json;

    fn daily() -> SeriesId {
        SeriesId::new("AAPL", TimeFrame::day())
    }

    fn day(d: u32, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        Bar::new(ts, close, close + 1.0, close - 1.0, close, 100.0)
    }

    #[test]
    fn clean_weekday_series_has_no_issues() {
        // Tue..Fri, then Mon: the weekend step is exactly three days.
        let bars: Vec<Bar> = [2, 3, 4, 5, 8, 9]
            .into_iter()
            .map(|d| day(d, 100.0 + d as f64))
            .collect();
        assert!(check_bars(&daily(), &bars).is_empty());
    }

    #[test]
    fn empty_table_is_flagged() {
        assert_eq!(check_bars(&daily(), &[]), vec![Issue::EmptyData]);
    }

    #[test]
    fn row_level_problems_are_counted() {
        let mut bad_range = day(3, 10.0);
        bad_range.high = Some(5.0);
        let mut gap_row = day(4, 10.0);
        gap_row.volume = Some(0.0);
        gap_row.open = None;
        let bars = vec![day(2, 10.0), bad_range, gap_row, day(2, 11.0)];

        let issues = check_bars(&daily(), &bars);
        assert_eq!(
            serde_json::to_value(&issues).unwrap(),
            json!([
                { "type": "missing_values", "columns": { "open": 1 } },
                { "type": "duplicate_timestamps", "count": 1 },
                {
                    "type": "price_inconsistency",
                    "high_below_low": 1,
                    "close_outside_range": 1,
                    "open_outside_range": 1
                },
                { "type": "volume_anomaly", "rows": 1 }
            ])
        );
    }

    #[test]
    fn daily_gap_over_three_days() {
        let bars = vec![day(2, 10.0), day(3, 10.0), day(10, 10.0)];
        assert_eq!(
            check_bars(&daily(), &bars),
            vec![Issue::TimeGaps {
                count: 1,
                threshold_secs: 3 * 86_400
            }]
        );
    }

    #[test]
    fn intraday_gap_is_relative_to_median_step() {
        let id = SeriesId::new("AAPL", "5m".parse().unwrap());
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let mut bars: Vec<Bar> = (0..6)
            .map(|i| Bar::new(start + Duration::minutes(5 * i), 1.0, 1.0, 1.0, 1.0, 1.0))
            .collect();
        bars.push(Bar::new(start + Duration::hours(20), 1.0, 1.0, 1.0, 1.0, 1.0));
        assert_eq!(
            check_bars(&id, &bars),
            vec![Issue::TimeGaps {
                count: 1,
                threshold_secs: 50 * 60
            }]
        );
    }

    #[test]
    fn single_jump_is_an_outlier() {
        let id = SeriesId::new("AAPL", "1h".parse().unwrap());
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut bars: Vec<Bar> = (0..40)
            .map(|i| {
                let close = 100.0 + if i % 2 == 0 { 0.0 } else { 0.1 };
                Bar::new(start + Duration::hours(i), close, 200.0, 1.0, close, 5.0)
            })
            .collect();
        bars[20].close = Some(150.0);
        bars[20].open = Some(150.0);
        let issues = check_bars(&id, &bars);
        assert!(matches!(issues.as_slice(), [Issue::OutlierDetection { count }] if *count >= 1));
    }

    #[test]
    fn report_totals_and_file_name() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let report = QualityReport::new(
            vec![
                SeriesQuality {
                    id: daily(),
                    records: 10,
                    issues: vec![],
                },
                SeriesQuality {
                    id: SeriesId::new("MSFT", TimeFrame::day()),
                    records: 0,
                    issues: vec![Issue::EmptyData],
                },
            ],
            now,
        );
        assert_eq!(report.total_records, 10);
        assert_eq!(report.series_with_issues, 1);
        assert_eq!(report.anomalies_detected, 1);
        assert_eq!(report.file_name(), "quality_report_20250304_050607.json");

        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir.path().join("reports"), &report).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(parsed["series"][1]["issues"][0]["type"], "empty_data");
        assert_eq!(parsed["series"][0]["id"]["interval"], "1d");
    }
}
