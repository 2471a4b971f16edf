use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{KairosError, KairosResult};

pub type Timestamp = DateTime<Utc>;

const MICROS_PER_SECOND: i64 = 1_000_000;
const SECONDS_PER_DAY: i64 = 86_400;

pub fn to_micros(time: Timestamp) -> i64 {
    time.timestamp_micros()
}

pub fn from_micros(value: i64) -> KairosResult<Timestamp> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| KairosError::storage(format!("timestamp {value} out of range")))
}

pub fn parse_timestamp(value: &str) -> KairosResult<Timestamp> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| KairosError::bad_request(format!("'{value}' is not a valid date-time: {err}")))
}

pub fn format_timestamp(time: Timestamp) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// ISO-8601 duration reduced to a fixed width.
///
/// Calendar designators are approximated: a year counts 365 days and a month 30 days.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IsoDuration {
    raw: String,
    micros: i64,
}

impl IsoDuration {
    pub fn parse(value: &str) -> KairosResult<Self> {
        let invalid =
            || KairosError::bad_request(format!("'{value}' is not a valid ISO-8601 duration"));
        let body = value.strip_prefix('P').ok_or_else(invalid)?;
        if body.is_empty() {
            return Err(invalid());
        }
        let (date_part, time_part) = match body.split_once('T') {
            Some((date, time)) if !time.is_empty() => (date, Some(time)),
            Some(_) => return Err(invalid()),
            None => (body, None),
        };

        let mut seconds = 0f64;
        for (amount, unit) in designators(date_part).ok_or_else(invalid)? {
            let factor = match unit {
                'Y' => 365 * SECONDS_PER_DAY,
                'M' => 30 * SECONDS_PER_DAY,
                'W' => 7 * SECONDS_PER_DAY,
                'D' => SECONDS_PER_DAY,
                _ => return Err(invalid()),
            };
            seconds += amount * factor as f64;
        }
        if let Some(time_part) = time_part {
            for (amount, unit) in designators(time_part).ok_or_else(invalid)? {
                let factor = match unit {
                    'H' => 3_600,
                    'M' => 60,
                    'S' => 1,
                    _ => return Err(invalid()),
                };
                seconds += amount * factor as f64;
            }
        }
        let micros = (seconds * MICROS_PER_SECOND as f64).round();
        if !micros.is_finite() || micros > i64::MAX as f64 {
            return Err(invalid());
        }
        Ok(Self {
            raw: value.to_string(),
            micros: micros as i64,
        })
    }

    pub fn as_micros(&self) -> i64 {
        self.micros
    }

    pub fn is_zero(&self) -> bool {
        self.micros == 0
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// Splits "1DT" style segments into (amount, designator) pairs; None on malformed input.
fn designators(segment: &str) -> Option<Vec<(f64, char)>> {
    let mut parts = Vec::new();
    let mut number = String::new();
    for c in segment.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
        } else if c.is_ascii_uppercase() {
            if number.is_empty() {
                return None;
            }
            let amount: f64 = number.parse().ok()?;
            parts.push((amount, c));
            number.clear();
        } else {
            return None;
        }
    }
    if number.is_empty() { Some(parts) } else { None }
}

/// Bucket width of an aggregation: a fixed duration or the whole matched range.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum AggrPeriod {
    #[default]
    WholeRange,
    Every(IsoDuration),
}

impl AggrPeriod {
    pub const WHOLE_RANGE: &'static str = "PT0S";

    pub fn parse(value: &str) -> KairosResult<Self> {
        let duration = IsoDuration::parse(value)?;
        if duration.is_zero() {
            Ok(Self::WholeRange)
        } else {
            Ok(Self::Every(duration))
        }
    }

    pub fn width_micros(&self) -> Option<i64> {
        match self {
            Self::WholeRange => None,
            Self::Every(duration) => Some(duration.as_micros()),
        }
    }
}

impl fmt::Display for AggrPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WholeRange => f.write_str(Self::WHOLE_RANGE),
            Self::Every(duration) => duration.fmt(f),
        }
    }
}

impl Serialize for AggrPeriod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AggrPeriod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        AggrPeriod::parse(&value).map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}
