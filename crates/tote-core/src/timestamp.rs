//! Timestamp formats shared by the watermark, staging keys and captures.
//!
//! Every stage renders timestamps as `YYYY-MM-DD HH:MM:SS.ffffff` (microsecond
//! precision, no timezone). Parsing accepts any fractional precision,
//! including none, so values written by older tooling still compare correctly.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

use crate::error::{ParseError, TimestampFormatSnafu};

/// Full timestamp format with microseconds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
/// Date part of a staging key.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Time part of a staging key.
pub const TIME_FORMAT: &str = "%H:%M:%S%.6f";

const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse a `YYYY-MM-DD HH:MM:SS[.f]` timestamp.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), PARSE_FORMAT).map_err(|_| {
        TimestampFormatSnafu {
            value: value.to_string(),
        }
        .build()
    })
}

/// Render a timestamp with microsecond precision.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse the date part of a staging key.
pub fn parse_date(value: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        TimestampFormatSnafu {
            value: value.to_string(),
        }
        .build()
    })
}

/// Parse the time part of a staging key.
pub fn parse_time(value: &str) -> Result<NaiveTime, ParseError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f").map_err(|_| {
        TimestampFormatSnafu {
            value: value.to_string(),
        }
        .build()
    })
}

/// Days since 1970-01-01, the Arrow `Date32` representation.
pub fn date_to_days(date: &NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

/// Timestamp taken once at the start of an extraction run.
///
/// Every snapshot staged by the run is keyed under it, and it becomes the new
/// watermark once all snapshots are staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunTimestamp(NaiveDateTime);

impl RunTimestamp {
    /// Capture the current UTC wall clock, truncated to microseconds.
    pub fn now() -> Self {
        let now = chrono::Utc::now().naive_utc();
        // Keys and watermarks only carry microseconds.
        let micros = now.and_utc().timestamp_micros();
        Self(
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| dt.naive_utc())
                .unwrap_or(now),
        )
    }

    pub fn parse(value: &str) -> Result<Self, ParseError> {
        parse_timestamp(value).map(Self)
    }

    pub fn from_naive(ts: NaiveDateTime) -> Self {
        Self(ts)
    }

    pub fn as_naive(&self) -> &NaiveDateTime {
        &self.0
    }

    /// `YYYY-MM-DD`
    pub fn date_part(&self) -> String {
        self.0.format(DATE_FORMAT).to_string()
    }

    /// `HH:MM:SS.ffffff`
    pub fn time_part(&self) -> String {
        self.0.format(TIME_FORMAT).to_string()
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_timestamp(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_microseconds() {
        let ts = parse_timestamp("2024-02-20 15:07:09.880000").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-02-20 15:07:09.880000");
    }

    #[test]
    fn test_parse_without_fraction() {
        let ts = parse_timestamp("2022-11-03 14:20:49").unwrap();
        assert_eq!(format_timestamp(&ts), "2022-11-03 14:20:49.000000");
    }

    #[test]
    fn test_parse_short_fraction_pads() {
        let ts = parse_timestamp("2022-11-03 14:20:49.962").unwrap();
        assert_eq!(format_timestamp(&ts), "2022-11-03 14:20:49.962000");
    }

    #[test]
    fn test_date_to_days() {
        assert_eq!(date_to_days(&NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()), 0);
        assert_eq!(date_to_days(&NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()), -1);
        assert_eq!(date_to_days(&NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()), 14610);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(ParseError::TimestampFormat { .. })
        ));
        assert!(parse_timestamp("2024-13-01 00:00:00").is_err());
    }

    #[test]
    fn test_run_timestamp_parts() {
        let run = RunTimestamp::parse("2024-02-14 10:00:00.000000").unwrap();
        assert_eq!(run.date_part(), "2024-02-14");
        assert_eq!(run.time_part(), "10:00:00.000000");
        assert_eq!(run.to_string(), "2024-02-14 10:00:00.000000");
    }

    #[test]
    fn test_run_timestamp_now_round_trips_through_format() {
        let run = RunTimestamp::now();
        let reparsed = RunTimestamp::parse(&run.to_string()).unwrap();
        assert_eq!(run, reparsed);
    }

    #[test]
    fn test_parse_date_and_time_parts() {
        assert_eq!(
            parse_date("2024-02-14").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 14).unwrap()
        );
        assert!(parse_date("14/02/2024").is_err());
        assert_eq!(
            parse_time("10:00:00.000001").unwrap(),
            NaiveTime::from_hms_micro_opt(10, 0, 0, 1).unwrap()
        );
    }
}
