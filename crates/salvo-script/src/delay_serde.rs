use serde::{self, Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Raw delay as written in a script: plain milliseconds or a suffixed string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDelay {
    Millis(u64),
    Fractional(f64),
    Text(String),
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawDelay>::deserialize(deserializer)?;
    match raw {
        None => Ok(Duration::ZERO),
        Some(raw) => from_raw(raw).map_err(serde::de::Error::custom),
    }
}

fn from_raw(raw: RawDelay) -> Result<Duration, String> {
    match raw {
        RawDelay::Millis(ms) => Ok(Duration::from_millis(ms)),
        RawDelay::Fractional(ms) if ms.is_finite() && ms >= 0.0 => {
            Ok(Duration::from_millis(ms as u64))
        }
        RawDelay::Fractional(ms) => Err(format!("invalid delay: {}", ms)),
        RawDelay::Text(s) => parse_delay_str(&s),
    }
}

/// Parse `"250"`, `"250ms"`, `"2s"`, `"1m"`, `"1h"` or `"1d"`. A bare number is milliseconds.
pub fn parse_delay_str(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Duration::ZERO);
    }
    let parse = |val: &str| -> Result<u64, String> {
        val.trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid delay '{}': {}", s, e))
    };
    let secs = |val: &str, unit: u64| -> Result<Duration, String> {
        parse(val)?
            .checked_mul(unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("delay '{}' out of range", s))
    };
    if let Some(val) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(val)?))
    } else if let Some(val) = s.strip_suffix('s') {
        secs(val, 1)
    } else if let Some(val) = s.strip_suffix('m') {
        secs(val, 60)
    } else if let Some(val) = s.strip_suffix('h') {
        secs(val, 3600)
    } else if let Some(val) = s.strip_suffix('d') {
        secs(val, 86400)
    } else {
        Ok(Duration::from_millis(parse(s)?))
    }
}

/// Same encoding for optional delays (absent stays `None`).
pub mod option {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawDelay>::deserialize(deserializer)?;
        raw.map(from_raw)
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
