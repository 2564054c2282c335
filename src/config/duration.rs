//! # Duration Parsing
//!
//! Kubernetes-style duration strings: `30s`, `5m`, `24h`, `1d`.

use crate::error::{Error, Result};
use regex::Regex;
use std::time::Duration;

/// Parse a `<number><unit>` duration string
///
/// The unit is one of `s`, `m`, `h`, `d` (case insensitive) and the number
/// must be greater than zero.
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidConfig(
            "duration string cannot be empty".to_string(),
        ));
    }

    let duration_regex = Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$")
        .map_err(|e| Error::InvalidConfig(format!("failed to compile duration regex: {e}")))?;

    let lower = trimmed.to_lowercase();
    let captures = duration_regex.captures(&lower).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "invalid duration format '{trimmed}', expected <number><unit> (e.g. '1m', '5m', '24h')"
        ))
    })?;

    let number: u64 = captures["number"].parse().map_err(|e| {
        Error::InvalidConfig(format!("invalid duration number in '{trimmed}': {e}"))
    })?;
    if number == 0 {
        return Err(Error::InvalidConfig(format!(
            "duration must be greater than 0, got '{trimmed}'"
        )));
    }

    let multiplier = match &captures["unit"] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => 86400,
    };
    let seconds = number.checked_mul(multiplier).ok_or_else(|| {
        Error::InvalidConfig(format!("duration '{trimmed}' is out of range"))
    })?;

    Ok(Duration::from_secs(seconds))
}
