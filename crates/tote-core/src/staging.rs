//! Staging keys.
//!
//! A staged file lives at `{table}/{date}/{time}.{ext}`, where `date` and
//! `time` come from splitting the run timestamp on its space. The key carries
//! literal `:` characters; event notifications may deliver them percent
//! encoded as `%3A`, so keys arriving from events go through [`unescape_key`]
//! before use.

use object_store::path::Path;
use std::fmt;

use crate::error::{ParseError, StagingKeyFormatSnafu};
use crate::timestamp::{RunTimestamp, parse_date, parse_time};

/// Extension of every staged file.
pub const PARQUET_EXTENSION: &str = "parquet";

const ESCAPED_COLON: &str = "%3A";

/// Decode the percent-encoded colons of a key as delivered by storage
/// events. Accepts either case of the hex digits.
pub fn unescape_key(key: &str) -> String {
    key.replace(ESCAPED_COLON, ":").replace("%3a", ":")
}

/// Key of one staged snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingKey {
    table: String,
    date: String,
    time: String,
    extension: String,
}

impl StagingKey {
    /// Key for `table` within the run stamped `run`.
    pub fn new(table: impl Into<String>, run: &RunTimestamp) -> Self {
        Self {
            table: table.into(),
            date: run.date_part(),
            time: run.time_part(),
            extension: PARQUET_EXTENSION.to_string(),
        }
    }

    /// Parse `{table}/{date}/{time}.{ext}`, unescaping `%3A` first.
    pub fn parse(key: &str) -> Result<Self, ParseError> {
        let unescaped = unescape_key(key);
        let fail = |reason: &str| {
            StagingKeyFormatSnafu {
                key: key.to_string(),
                reason: reason.to_string(),
            }
            .fail()
        };

        let segments: Vec<&str> = unescaped.split('/').collect();
        let [table, date, file] = segments.as_slice() else {
            return fail("expected exactly three '/'-separated segments");
        };
        if table.is_empty() {
            return fail("table segment is empty");
        }
        let Some((time, extension)) = file.rsplit_once('.') else {
            return fail("file name has no extension");
        };
        // Times carry a fractional part, so the last dot separates the extension.
        if extension.is_empty() || extension.chars().any(|c| c.is_ascii_digit()) {
            return fail("file name has no extension");
        }
        if parse_date(date).is_err() {
            return fail("date segment is not YYYY-MM-DD");
        }
        if parse_time(time).is_err() {
            return fail("time segment is not HH:MM:SS.ffffff");
        }

        Ok(Self {
            table: table.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            extension: extension.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The run timestamp this key was derived from.
    pub fn run_timestamp(&self) -> Result<RunTimestamp, ParseError> {
        RunTimestamp::parse(&format!("{} {}", self.date, self.time))
    }

    /// Same partition, different table. Used when a transformed file is
    /// written under its warehouse table name.
    pub fn with_table(&self, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..self.clone()
        }
    }

    /// Object store path for this key (colons kept literal).
    pub fn to_path(&self) -> Path {
        Path::from(self.to_string())
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}.{}",
            self.table, self.date, self.time, self.extension
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> RunTimestamp {
        RunTimestamp::parse("2024-02-14 10:00:00.000000").unwrap()
    }

    #[test]
    fn test_key_from_run_timestamp() {
        let key = StagingKey::new("staff", &run());
        assert_eq!(key.to_string(), "staff/2024-02-14/10:00:00.000000.parquet");
    }

    #[test]
    fn test_parse_round_trip() {
        let key = StagingKey::parse("staff/2024-02-14/10:00:00.000000.parquet").unwrap();
        assert_eq!(key.table(), "staff");
        assert_eq!(key.date(), "2024-02-14");
        assert_eq!(key.time(), "10:00:00.000000");
        assert_eq!(key.extension(), "parquet");
        assert_eq!(key.run_timestamp().unwrap(), run());
    }

    #[test]
    fn test_parse_unescapes_event_encoding() {
        let key = StagingKey::parse("sales_order/2024-02-14/10%3A00%3A00.000000.parquet").unwrap();
        assert_eq!(
            key.to_string(),
            "sales_order/2024-02-14/10:00:00.000000.parquet"
        );
    }

    #[test]
    fn test_unescape_either_case() {
        assert_eq!(
            unescape_key("staff/2024-02-14/10%3A00%3a00.000000.parquet"),
            "staff/2024-02-14/10:00:00.000000.parquet"
        );
        assert_eq!(unescape_key("staff/2024-02-14"), "staff/2024-02-14");
    }

    #[test]
    fn test_with_table_keeps_partition() {
        let key = StagingKey::new("address", &run()).with_table("dim_location");
        assert_eq!(
            key.to_string(),
            "dim_location/2024-02-14/10:00:00.000000.parquet"
        );
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        for bad in [
            "staff/10:00:00.000000.parquet",
            "staff/2024-02-14/extra/10:00:00.000000.parquet",
            "/2024-02-14/10:00:00.000000.parquet",
            "staff/14-02-2024/10:00:00.000000.parquet",
            "staff/2024-02-14/ten.parquet",
            "staff/2024-02-14/10:00:00.000000",
        ] {
            assert!(
                matches!(StagingKey::parse(bad), Err(ParseError::StagingKeyFormat { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_path_keeps_literal_colons() {
        let path = StagingKey::new("staff", &run()).to_path();
        assert_eq!(path.as_ref(), "staff/2024-02-14/10:00:00.000000.parquet");
    }
}
