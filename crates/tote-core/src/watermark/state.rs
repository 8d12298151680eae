//! The change-capture watermark value.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::timestamp::{RunTimestamp, format_timestamp, parse_timestamp};

/// Stored value meaning "nothing captured yet".
pub const INITIAL_SENTINEL: &str = "None";

/// High-water mark of captured change times.
///
/// - `Initial`: no run has completed; capture everything
/// - `At`: rows changed at or before this instant are already captured
///
/// Serializes as the stored string form: `"None"` or
/// `"YYYY-MM-DD HH:MM:SS.ffffff"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Watermark {
    #[default]
    Initial,
    At(NaiveDateTime),
}

impl Watermark {
    /// Parse the stored string form.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        if value.trim() == INITIAL_SENTINEL {
            return Ok(Watermark::Initial);
        }
        parse_timestamp(value).map(Watermark::At)
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Watermark::Initial)
    }

    /// Instant of the watermark, `None` before the first run.
    pub fn timestamp(&self) -> Option<&NaiveDateTime> {
        match self {
            Watermark::Initial => None,
            Watermark::At(ts) => Some(ts),
        }
    }

    /// Whether a row changed at `change_time` still needs capturing.
    ///
    /// Strictly greater than: a row stamped exactly at the watermark was
    /// captured by the run that set it.
    pub fn admits(&self, change_time: &NaiveDateTime) -> bool {
        match self {
            Watermark::Initial => true,
            Watermark::At(ts) => change_time > ts,
        }
    }

    /// Whether moving to `next` keeps the watermark non-decreasing.
    pub fn can_advance_to(&self, next: &Watermark) -> bool {
        match (self, next) {
            (_, Watermark::Initial) => self.is_initial(),
            (Watermark::Initial, Watermark::At(_)) => true,
            (Watermark::At(current), Watermark::At(next)) => next >= current,
        }
    }
}

impl From<RunTimestamp> for Watermark {
    fn from(run: RunTimestamp) -> Self {
        Watermark::At(*run.as_naive())
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::Initial => f.write_str(INITIAL_SENTINEL),
            Watermark::At(ts) => f.write_str(&format_timestamp(ts)),
        }
    }
}

impl FromStr for Watermark {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Watermark::parse(s)
    }
}

impl Serialize for Watermark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Watermark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Watermark::parse(&value).map_err(serde::de::Error::custom)
    }
}
