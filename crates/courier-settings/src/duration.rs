//! Human-friendly duration strings (`500ms`, `5s`, `2m`, `1h`, or bare seconds).

use std::time::Duration;

use crate::errors::{Result, SettingsError};

/// Parse a duration string.
///
/// A bare number is read as seconds. Fractional values are accepted
/// (`1.5s`). Zero and negative values are rejected.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let value = raw.trim();
    let invalid = || SettingsError::InvalidDuration(raw.to_string());

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let amount: f64 = number.parse().map_err(|_| invalid())?;

    let secs = match unit.trim() {
        "ms" => amount / 1000.0,
        "" | "s" => amount,
        "m" => amount * 60.0,
        "h" => amount * 3600.0,
        _ => return Err(invalid()),
    };

    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

/// Render a duration in the shortest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms % 3_600_000 == 0 && ms > 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 && ms > 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1000 == 0 && ms > 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}
