//! Combining freshly cleaned bars into a master table.
//!
//! Timestamps are the key. On conflict the row that was already in the master
//! table wins; incoming rows only ever add timestamps the table did not have.

use std::collections::HashSet;

use market_data_ingestor::models::bar::Bar;

use crate::table::MasterTable;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// There was no master table; `table` is the first one.
    Created { table: MasterTable },
    /// `added` holds the new rows, sorted; `table` is the full result.
    Appended { table: MasterTable, added: Vec<Bar> },
    /// Nothing new. The stored table must not be rewritten.
    Unchanged,
}

impl MergeOutcome {
    /// Table to persist, if any.
    pub fn table(&self) -> Option<&MasterTable> {
        match self {
            MergeOutcome::Created { table } | MergeOutcome::Appended { table, .. } => Some(table),
            MergeOutcome::Unchanged => None,
        }
    }

    /// Rows this merge introduced.
    pub fn new_rows(&self) -> &[Bar] {
        match self {
            MergeOutcome::Created { table } => table.bars(),
            MergeOutcome::Appended { added, .. } => added,
            MergeOutcome::Unchanged => &[],
        }
    }
}

pub fn merge(existing: Option<&MasterTable>, incoming: Vec<Bar>) -> MergeOutcome {
    let Some(existing) = existing else {
        if incoming.is_empty() {
            return MergeOutcome::Unchanged;
        }
        return MergeOutcome::Created {
            table: MasterTable::from_bars(incoming),
        };
    };

    let mut seen = HashSet::new();
    let mut added: Vec<Bar> = incoming
        .into_iter()
        .filter(|b| !existing.contains(b.timestamp) && seen.insert(b.timestamp))
        .collect();
    if added.is_empty() {
        return MergeOutcome::Unchanged;
    }
    added.sort_by_key(|b| b.timestamp);

    let mut bars = Vec::with_capacity(existing.len() + added.len());
    bars.extend_from_slice(existing.bars());
    bars.extend(added.iter().cloned());
    MergeOutcome::Appended {
        table: MasterTable::from_bars(bars),
        added,
    }
}
