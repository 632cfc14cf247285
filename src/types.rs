use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Recurrence declared by a pipeline.
///
/// - `Once`: manual trigger only (`"@once"`).
/// - `Every(d)`: repeat every `d` (`"@hourly"`, `"@daily"`, `"@weekly"`, or
///   a duration such as `"30m"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    #[default]
    Once,
    Every(Duration),
}

impl Schedule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Schedule::Once => None,
            Schedule::Every(d) => Some(*d),
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const HOUR: u64 = 60 * 60;
        match s.trim().to_lowercase().as_str() {
            "@once" | "once" | "manual" => Ok(Schedule::Once),
            "@hourly" => Ok(Schedule::Every(Duration::from_secs(HOUR))),
            "@daily" => Ok(Schedule::Every(Duration::from_secs(24 * HOUR))),
            "@weekly" => Ok(Schedule::Every(Duration::from_secs(7 * 24 * HOUR))),
            other => {
                let d = parse_duration(other)
                    .map_err(|e| format!("invalid schedule '{other}': {e}"))?;
                if d.is_zero() {
                    return Err("schedule interval must be > 0".to_string());
                }
                Ok(Schedule::Every(d))
            }
        }
    }
}

/// How a producer names the artifact it writes.
///
/// The policy is fixed per task, so every retry within a run targets the same
/// key: `Fixed` overwrites, `Timestamped` renders `{timestamp}` from the run
/// start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NamingPolicy {
    #[default]
    Fixed,
    Timestamped,
}

/// What counts as "the watch target has appeared".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Any object at the key.
    #[default]
    Exists,
    /// An object with at least one byte.
    NonEmpty,
}

impl Predicate {
    pub fn matches(&self, size: u64) -> bool {
        match self {
            Predicate::Exists => true,
            Predicate::NonEmpty => size > 0,
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(value, 60),
        "h" => secs(value, 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn secs(value: u64, scale: u64) -> Result<Duration, String> {
    value
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(|| "duration too large".to_string())
}
