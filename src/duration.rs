//! Timeout parsing for configuration values.
//!
//! Timeouts can be written either as human-readable strings (`"2m"`,
//! `"90s"`, `"500ms"`) or as plain integers, which are interpreted as
//! milliseconds to stay compatible with deploy-time configs that predate the
//! string form (`upload = 120000`).

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Parse a duration string like `"2m"`, `"90s"`, `"500ms"` or `"1h"`.
///
/// A bare number is read as milliseconds.
///
/// # Examples
///
/// ```
/// use statement_analyzer::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("120000").unwrap(), Duration::from_secs(120));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        anyhow::bail!("Duration must not be empty");
    }

    // "ms" must be checked before "m" and "s".
    let (num, millis_per_unit): (&str, u64) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60 * 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60 * 1000)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration: {s}"))?;
    let millis = num
        .checked_mul(millis_per_unit)
        .context("Duration is too large")?;

    Ok(Duration::from_millis(millis))
}

/// Format a timeout using the largest unit that divides it evenly.
///
/// ```
/// use statement_analyzer::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(120)), "2m");
/// assert_eq!(format_duration(Duration::from_secs(45)), "45s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
/// ```
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();

    const MS_PER_HOUR: u128 = 60 * 60 * 1000;
    const MS_PER_MINUTE: u128 = 60 * 1000;
    const MS_PER_SECOND: u128 = 1000;

    if millis >= MS_PER_HOUR && millis % MS_PER_HOUR == 0 {
        format!("{}h", millis / MS_PER_HOUR)
    } else if millis >= MS_PER_MINUTE && millis % MS_PER_MINUTE == 0 {
        format!("{}m", millis / MS_PER_MINUTE)
    } else if millis >= MS_PER_SECOND && millis % MS_PER_SECOND == 0 {
        format!("{}s", millis / MS_PER_SECOND)
    } else {
        format!("{millis}ms")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Millis(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration(self) -> Result<Duration> {
        match self {
            RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
            RawDuration::Text(s) => parse_duration(&s),
        }
    }
}

/// Serde deserializer accepting a duration string or integer milliseconds.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    RawDuration::deserialize(deserializer)?
        .into_duration()
        .map_err(de::Error::custom)
}
