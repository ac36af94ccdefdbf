//! The master table: the sorted, deduplicated bar history of one identity.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use market_data_ingestor::models::bar::Bar;

/// Bars sorted ascending by timestamp, one per timestamp.
///
/// The only constructors sort and collapse duplicates, so the invariant holds
/// for every value of this type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterTable {
    bars: Vec<Bar>,
}

impl MasterTable {
    /// Sorts `bars` and keeps the first bar seen for each timestamp.
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        let mut seen = HashSet::with_capacity(bars.len());
        let mut bars: Vec<Bar> = bars
            .into_iter()
            .filter(|b| seen.insert(b.timestamp))
            .collect();
        // Stable, and timestamps are unique by now.
        bars.sort_by_key(|b| b.timestamp);
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.first().map(|b| b.timestamp)
    }

    /// Newest timestamp in the table.
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.timestamp)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.bars.binary_search_by_key(&ts, |b| b.timestamp).is_ok()
    }

    pub fn get(&self, ts: DateTime<Utc>) -> Option<&Bar> {
        self.bars
            .binary_search_by_key(&ts, |b| b.timestamp)
            .ok()
            .map(|i| &self.bars[i])
    }

    /// Bars strictly newer than `after`; every bar when `after` is `None`.
    pub fn newer_than(&self, after: Option<DateTime<Utc>>) -> &[Bar] {
        match after {
            None => &self.bars,
            Some(ts) => {
                let start = self.bars.partition_point(|b| b.timestamp <= ts);
                &self.bars[start..]
            }
        }
    }
}
