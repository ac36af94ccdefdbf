use crate::{
    models::{
        request_params::{FetchRequest, Lookback},
        timeframe::{TimeFrame, TimeFrameUnit},
    },
    providers::{ProviderError, ValidationSnafu},
};

const MINUTE_AMOUNTS: [u32; 7] = [1, 2, 5, 15, 30, 60, 90];
const MONTH_AMOUNTS: [u32; 2] = [1, 3];

/// Maps a [`TimeFrame`] to the endpoint's `interval` code.
pub fn interval_code(timeframe: &TimeFrame) -> Result<String, ProviderError> {
    let supported = match timeframe.unit {
        TimeFrameUnit::Minute => MINUTE_AMOUNTS.contains(&timeframe.amount),
        TimeFrameUnit::Hour => timeframe.amount == 1,
        TimeFrameUnit::Day | TimeFrameUnit::Week => timeframe.amount == 1,
        TimeFrameUnit::Month => MONTH_AMOUNTS.contains(&timeframe.amount),
    };
    if !supported {
        return ValidationSnafu {
            message: format!("interval '{timeframe}' is not served by the chart endpoint"),
        }
        .fail();
    }
    Ok(timeframe.to_string())
}

/// Furthest the endpoint reaches back for an interval.
pub fn lookback_cap(timeframe: &TimeFrame) -> Lookback {
    match (timeframe.unit, timeframe.amount) {
        (TimeFrameUnit::Minute, 1) => Lookback::Days(7),
        (TimeFrameUnit::Minute, _) => Lookback::Days(60),
        (TimeFrameUnit::Hour, _) => Lookback::Days(730),
        _ => Lookback::Max,
    }
}

pub fn validate_request(request: &FetchRequest) -> Result<(), ProviderError> {
    if request.symbol.trim().is_empty() {
        return ValidationSnafu {
            message: "symbol must not be empty",
        }
        .fail();
    }
    interval_code(&request.timeframe)?;
    let cap = lookback_cap(&request.timeframe);
    if request.lookback.exceeds(cap) {
        return ValidationSnafu {
            message: format!(
                "lookback {} exceeds the {cap} limit for {} bars",
                request.lookback, request.timeframe
            ),
        }
        .fail();
    }
    Ok(())
}

/// Query string for one chart request. Assumes `validate_request` passed.
pub fn construct_params(request: &FetchRequest) -> Vec<(String, String)> {
    vec![
        ("interval".to_string(), request.timeframe.to_string()),
        ("range".to_string(), request.lookback.to_string()),
        ("includePrePost".to_string(), "false".to_string()),
        ("events".to_string(), "div,splits".to_string()),
    ]
}
