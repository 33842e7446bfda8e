use chrono::{Duration, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const SECOND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PARSE_FORMATS: [&str; 4] = [
    SECOND_FORMAT,
    MINUTE_FORMAT,
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Resolution at which the clock is read when a task is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Minute,
    Second,
}

impl Precision {
    pub fn truncate(self, at: NaiveDateTime) -> NaiveDateTime {
        let whole_seconds = at.with_nanosecond(0).unwrap_or(at);
        match self {
            Precision::Second => whole_seconds,
            Precision::Minute => whole_seconds.with_second(0).unwrap_or(whole_seconds),
        }
    }
}

pub fn now(precision: Precision) -> NaiveDateTime {
    precision.truncate(Local::now().naive_local())
}

/// `start + timer_minutes`, or `None` when there is no timer or the sum
/// leaves the representable calendar range.
pub fn calculate_ends_at(start: NaiveDateTime, timer_minutes: Option<u32>) -> Option<NaiveDateTime> {
    let minutes = timer_minutes?;
    start.checked_add_signed(Duration::minutes(i64::from(minutes)))
}

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    if at.second() == 0 && at.nanosecond() == 0 {
        at.format(MINUTE_FORMAT).to_string()
    } else {
        at.format(SECOND_FORMAT).to_string()
    }
}

/// Fixed-width rendering at the given precision.
pub fn format_timestamp_with(at: &NaiveDateTime, precision: Precision) -> String {
    match precision {
        Precision::Minute => at.format(MINUTE_FORMAT).to_string(),
        Precision::Second => at.format(SECOND_FORMAT).to_string(),
    }
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let raw = raw.trim();
    let mut last_err = None;
    for format in PARSE_FORMATS {
        match NaiveDateTime::parse_from_str(raw, format) {
            Ok(at) => return Ok(at),
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) => Err(err),
        None => NaiveDateTime::parse_from_str(raw, MINUTE_FORMAT),
    }
}

/// Time left until `ends_at`, clamped at zero.
pub fn remaining(ends_at: NaiveDateTime, now: NaiveDateTime) -> Duration {
    let left = ends_at - now;
    if left < Duration::zero() {
        Duration::zero()
    } else {
        left
    }
}

pub fn format_remaining(left: Duration) -> String {
    let total = left.num_seconds().max(0);
    format!("{:02}:{:02} remaining", total / 60, total % 60)
}

/// Serde adapter for optional wall-clock timestamps stored as strings.
pub mod wall_clock {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_some(&format_timestamp(at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse_timestamp(text)
                .map(Some)
                .map_err(|err| serde::de::Error::custom(format!("bad timestamp {text:?}: {err}"))),
        }
    }
}
