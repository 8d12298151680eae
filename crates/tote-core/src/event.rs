//! Storage-event notifications.
//!
//! The transform and load stages are triggered once per staged object by an
//! S3-style notification:
//!
//! ```json
//! {"Records": [{"s3": {"bucket": {"name": "..."}, "object": {"key": "..."}}}]}
//! ```
//!
//! Only the first record is used.

use serde::Deserialize;
use snafu::prelude::*;
use tracing::warn;

use crate::error::{
    EventError, EventPayloadSnafu, InvalidEventSnafu, MalformedEventSnafu, ValidationError,
};
use crate::staging::unescape_key;

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    #[serde(default)]
    bucket: Option<BucketEntity>,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
}

/// Object referenced by a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: Option<String>,
    /// Key with `%3A` already decoded to `:`.
    pub key: String,
}

/// Extract the object reference from a notification payload.
pub fn parse_event(payload: &str) -> Result<ObjectRef, EventError> {
    let notification: Notification = serde_json::from_str(payload)
        .context(EventPayloadSnafu)
        .context(MalformedEventSnafu)?;

    let record_count = notification.records.len();
    let Some(record) = notification.records.into_iter().next() else {
        return Err(ValidationError::EmptyEventRecords).context(InvalidEventSnafu);
    };
    if record_count > 1 {
        warn!(
            records = record_count,
            "Notification has multiple records; only the first is processed"
        );
    }

    Ok(ObjectRef {
        bucket: record.s3.bucket.map(|b| b.name),
        key: unescape_key(&record.s3.object.key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(keys: &[&str]) -> String {
        let records: Vec<String> = keys
            .iter()
            .map(|key| {
                format!(
                    r#"{{"eventName": "ObjectCreated:Put", "s3": {{"bucket": {{"name": "ingestion-zone"}}, "object": {{"key": "{key}", "size": 1024}}}}}}"#
                )
            })
            .collect();
        format!(r#"{{"Records": [{}]}}"#, records.join(","))
    }

    #[test]
    fn test_key_is_unescaped() {
        let object =
            parse_event(&notification(&["staff/2024-02-14/10%3A00%3A00.000000.parquet"])).unwrap();
        assert_eq!(object.bucket.as_deref(), Some("ingestion-zone"));
        assert_eq!(object.key, "staff/2024-02-14/10:00:00.000000.parquet");
    }

    #[test]
    fn test_only_first_record_is_used() {
        let object = parse_event(&notification(&[
            "address/2024-02-14/10:00:00.000000.parquet",
            "staff/2024-02-14/10:00:00.000000.parquet",
        ]))
        .unwrap();
        assert!(object.key.starts_with("address/"));
    }

    #[test]
    fn test_no_records_is_validation_error() {
        let err = parse_event(r#"{"Records": []}"#).unwrap_err();
        assert!(matches!(
            err,
            EventError::InvalidEvent {
                source: ValidationError::EmptyEventRecords
            }
        ));
    }

    #[test]
    fn test_not_json_is_parse_error() {
        let err = parse_event("Records: staff").unwrap_err();
        assert!(matches!(err, EventError::MalformedEvent { .. }));
    }
}
