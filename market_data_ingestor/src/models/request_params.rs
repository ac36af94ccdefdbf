use std::{fmt, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::timeframe::{TimeFrame, TimeFrameError};

/// How far back a fetch reaches, relative to now.
///
/// Providers restrict lookback per interval (fine-grained data is only kept for
/// a short window), so requests carry a lookback period rather than a start date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Lookback {
    /// The last `n` calendar days.
    Days(u32),
    /// Everything the provider has.
    Max,
}

impl Lookback {
    /// `None` for [`Lookback::Max`].
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Lookback::Days(n) => Some(Duration::days(i64::from(*n))),
            Lookback::Max => None,
        }
    }

    /// True when `self` reaches further back than `cap`.
    pub fn exceeds(&self, cap: Lookback) -> bool {
        match (self, cap) {
            (_, Lookback::Max) => false,
            (Lookback::Max, Lookback::Days(_)) => true,
            (Lookback::Days(a), Lookback::Days(b)) => *a > b,
        }
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookback::Days(n) => write!(f, "{n}d"),
            Lookback::Max => f.write_str("max"),
        }
    }
}

impl FromStr for Lookback {
    type Err = TimeFrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "max" {
            return Ok(Lookback::Max);
        }
        let days = s
            .strip_suffix('d')
            .and_then(|d| d.parse::<u32>().ok())
            .filter(|d| *d > 0)
            .ok_or_else(|| TimeFrameError::InvalidInput {
                message: format!("invalid lookback '{s}', expected '<days>d' or 'max'"),
            })?;
        Ok(Lookback::Days(days))
    }
}

impl TryFrom<String> for Lookback {
    type Error = TimeFrameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Lookback> for String {
    fn from(value: Lookback) -> Self {
        value.to_string()
    }
}

/// Parameters of one fetch call: a single series over a lookback window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Provider symbol (e.g. `"AAPL"`, `"^GSPC"`, `"EURUSD=X"`).
    pub symbol: String,

    /// The time interval for each bar.
    ///
    /// Which intervals are accepted is up to each provider.
    pub timeframe: TimeFrame,

    /// How far back to fetch, ending now.
    pub lookback: Lookback,
}

impl FetchRequest {
    pub fn new(symbol: impl Into<String>, timeframe: TimeFrame, lookback: Lookback) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            lookback,
        }
    }
}
