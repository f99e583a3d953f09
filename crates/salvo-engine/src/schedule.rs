//! `run_at` resolution: when an operation should first start.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone};
use serde_json::Value;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const TIME_FORMATS: &[&str] = &[
    "%H:%M:%S",
    "%H:%M",
    "%I:%M %p",
    "%I:%M%p",
    "%I:%M:%S %p",
    "%I:%M:%S%p",
];

/// Resolve a `run_at` value to a local instant.
///
/// Accepts epoch milliseconds (number or digit string), RFC 3339, local
/// `YYYY-MM-DD HH:MM[:SS]` (space or `T`), or a time of day, which means its
/// next occurrence after `now`.
pub fn resolve_run_at(value: &Value, now: DateTime<Local>) -> Result<DateTime<Local>, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(from_epoch_millis)
            .ok_or_else(|| format!("invalid epoch milliseconds: {}", n)),
        Value::String(s) => parse_text(s.trim(), now),
        other => Err(format!("run_at must be a string or a number, found {}", other)),
    }
}

fn from_epoch_millis(ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(ms).single()
}

fn parse_text(text: &str, now: DateTime<Local>) -> Result<DateTime<Local>, String> {
    if text.is_empty() {
        return Err("run_at is empty".into());
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .ok()
            .and_then(from_epoch_millis)
            .ok_or_else(|| format!("invalid epoch milliseconds: {}", text));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Local));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| format!("'{}' does not exist in local time", text));
        }
    }
    let upper = text.to_ascii_uppercase();
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(&upper, format) {
            return next_occurrence(time, now)
                .ok_or_else(|| format!("'{}' does not exist in local time", text));
        }
    }
    Err(format!("unrecognised run_at '{}'", text))
}

/// The next local instant at `time` strictly after `now`: today if still
/// ahead, otherwise tomorrow.
fn next_occurrence(time: NaiveTime, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let today = now.date_naive();
    let candidate = Local.from_local_datetime(&today.and_time(time)).earliest()?;
    if candidate > now {
        return Some(candidate);
    }
    let tomorrow = today.succ_opt()?;
    Local.from_local_datetime(&tomorrow.and_time(time)).earliest()
}

/// How long to wait from `now` until `target`; zero for past instants.
pub fn delay_until(target: DateTime<Local>, now: DateTime<Local>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}
