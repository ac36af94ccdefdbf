//! `30s`, `15m`, `12h`, `7d`, `2w` style durations used in config files.

use chrono::Duration;

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let s = value.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in '{s}' (expected s, m, h, d or w)"))?;
    let (digits, unit) = s.split_at(split);
    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("missing amount in '{s}'"))?;
    if amount == 0 {
        return Err("duration must be greater than zero".into());
    }
    match unit.trim().to_lowercase().as_str() {
        "s" | "sec" | "secs" => Ok(Duration::seconds(amount)),
        "m" | "min" | "mins" => Ok(Duration::minutes(amount)),
        "h" | "hr" | "hrs" => Ok(Duration::hours(amount)),
        "d" | "day" | "days" => Ok(Duration::days(amount)),
        "w" | "wk" | "wks" => Ok(Duration::weeks(amount)),
        other => Err(format!("unknown unit '{other}'")),
    }
}

/// Inverse of [`parse_duration`] using the largest whole unit.
pub fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds();
    for (unit, size) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs != 0 && secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}
