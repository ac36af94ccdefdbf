//! Decides whether an identity's master table is due for a refresh.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::{duration::format_duration, table::MasterTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No master table yet.
    Missing,
    /// A master table with no rows.
    Empty,
    Stale { latest: DateTime<Utc>, age: Duration },
    Fresh { latest: DateTime<Utc>, age: Duration },
}

impl Freshness {
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Freshness::Fresh { .. })
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        match self {
            Freshness::Stale { latest, .. } | Freshness::Fresh { latest, .. } => Some(*latest),
            Freshness::Missing | Freshness::Empty => None,
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Missing => f.write_str("missing"),
            Freshness::Empty => f.write_str("empty"),
            Freshness::Stale { latest, age } => {
                write!(f, "stale (latest {latest}, {} old)", format_duration(*age))
            }
            Freshness::Fresh { latest, age } => {
                write!(f, "fresh (latest {latest}, {} old)", format_duration(*age))
            }
        }
    }
}

/// Classify a master table against `threshold` at `now`.
///
/// Age exactly equal to the threshold still counts as fresh.
pub fn assess(master: Option<&MasterTable>, now: DateTime<Utc>, threshold: Duration) -> Freshness {
    let Some(master) = master else {
        return Freshness::Missing;
    };
    let Some(latest) = master.latest() else {
        return Freshness::Empty;
    };
    let age = now - latest;
    if age > threshold {
        Freshness::Stale { latest, age }
    } else {
        Freshness::Fresh { latest, age }
    }
}

pub fn needs_refresh(master: Option<&MasterTable>, now: DateTime<Utc>, threshold: Duration) -> bool {
    assess(master, now, threshold).needs_refresh()
}
