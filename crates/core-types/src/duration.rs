use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SECS_PER_DAY: i64 = 86_400;
// Calendar units are converted with fixed lengths.
const SECS_PER_YEAR: i64 = 365 * SECS_PER_DAY;
const SECS_PER_MONTH: i64 = 30 * SECS_PER_DAY;
const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;
const MAX_SECS: i64 = i64::MAX / 1_000;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid ISO-8601 duration '{raw}': {reason}")]
pub struct DurationParseError {
    pub raw: String,
    pub reason: String,
}

impl DurationParseError {
    fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// An ISO-8601 duration (`PnYnMnWnDTnHnMnS`).
///
/// The input text is kept so it can be stored and echoed back verbatim.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IsoDuration {
    raw: String,
    duration: Duration,
}

impl IsoDuration {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Expiry instant `self` after `start`; `None` on overflow.
    pub fn expiry_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_add_signed(self.duration)
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for IsoDuration {
    type Error = DurationParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IsoDuration> for String {
    fn from(value: IsoDuration) -> Self {
        value.raw
    }
}

impl FromStr for IsoDuration {
    type Err = DurationParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix('P')
            .ok_or_else(|| DurationParseError::new(raw, "missing leading 'P'"))?;

        let (date_part, time_part) = match body.split_once('T') {
            Some((_, "")) => return Err(DurationParseError::new(raw, "empty time section")),
            Some((date, time)) => (date, Some(time)),
            None => (body, None),
        };

        let mut total = 0i64;
        let mut nanos = 0i64;
        let mut seen = 0usize;

        let mut rank = 0usize;
        for (value, unit) in components(raw, date_part)? {
            let (position, unit_secs) = match unit {
                'Y' => (1, SECS_PER_YEAR),
                'M' => (2, SECS_PER_MONTH),
                'W' => (3, SECS_PER_WEEK),
                'D' => (4, SECS_PER_DAY),
                other => {
                    return Err(DurationParseError::new(
                        raw,
                        format!("unexpected date designator '{other}'"),
                    ))
                }
            };
            if position <= rank {
                return Err(DurationParseError::new(raw, "designators out of order"));
            }
            rank = position;
            total = accumulate(raw, total, whole(raw, value)?, unit_secs)?;
            seen += 1;
        }

        if let Some(time_part) = time_part {
            let mut rank = 0usize;
            for (value, unit) in components(raw, time_part)? {
                let (position, unit_secs) = match unit {
                    'H' => (1, 3_600),
                    'M' => (2, 60),
                    'S' => (3, 1),
                    other => {
                        return Err(DurationParseError::new(
                            raw,
                            format!("unexpected time designator '{other}'"),
                        ))
                    }
                };
                if position <= rank {
                    return Err(DurationParseError::new(raw, "designators out of order"));
                }
                rank = position;
                if unit == 'S' {
                    let (secs, fraction) = seconds(raw, value)?;
                    total = accumulate(raw, total, secs, 1)?;
                    nanos = fraction;
                } else {
                    total = accumulate(raw, total, whole(raw, value)?, unit_secs)?;
                }
                seen += 1;
            }
        }

        if seen == 0 {
            return Err(DurationParseError::new(raw, "no components"));
        }

        let duration = Duration::seconds(total)
            .checked_add(&Duration::nanoseconds(nanos))
            .ok_or_else(|| DurationParseError::new(raw, "duration too large"))?;
        Ok(Self {
            raw: trimmed.to_string(),
            duration,
        })
    }
}

fn components<'a>(raw: &str, section: &'a str) -> Result<Vec<(&'a str, char)>, DurationParseError> {
    let mut result = Vec::new();
    let mut start = 0usize;
    for (idx, ch) in section.char_indices() {
        if ch.is_ascii_digit() || ch == '.' {
            continue;
        }
        let value = &section[start..idx];
        if value.is_empty() {
            return Err(DurationParseError::new(
                raw,
                format!("designator '{ch}' without a value"),
            ));
        }
        result.push((value, ch));
        start = idx + ch.len_utf8();
    }
    if start != section.len() {
        return Err(DurationParseError::new(raw, "trailing value without designator"));
    }
    Ok(result)
}

fn whole(raw: &str, value: &str) -> Result<i64, DurationParseError> {
    value
        .parse::<i64>()
        .map_err(|_| DurationParseError::new(raw, format!("'{value}' is not a whole number")))
}

fn seconds(raw: &str, value: &str) -> Result<(i64, i64), DurationParseError> {
    let Some((secs, fraction)) = value.split_once('.') else {
        return Ok((whole(raw, value)?, 0));
    };
    if secs.is_empty() || fraction.is_empty() || fraction.len() > 9 || fraction.contains('.') {
        return Err(DurationParseError::new(
            raw,
            format!("'{value}' is not a valid seconds value"),
        ));
    }
    let padded = format!("{fraction:0<9}");
    Ok((whole(raw, secs)?, whole(raw, &padded)?))
}

fn accumulate(raw: &str, total: i64, value: i64, unit_secs: i64) -> Result<i64, DurationParseError> {
    value
        .checked_mul(unit_secs)
        .and_then(|secs| total.checked_add(secs))
        .filter(|secs| *secs <= MAX_SECS)
        .ok_or_else(|| DurationParseError::new(raw, "duration too large"))
}
