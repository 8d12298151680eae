//! Change-time split: `created_at` becomes `created_date` + `created_time`,
//! `last_updated` becomes `last_updated_date` + `last_updated_time`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use snafu::ResultExt;

use tote_core::arrow::array::{Array, ArrayRef, AsArray, Date32Builder, StringBuilder};
use tote_core::arrow::compute::cast;
use tote_core::arrow::datatypes::{DataType, Field, Schema, TimeUnit, TimestampMicrosecondType};
use tote_core::arrow::record_batch::RecordBatch;
use tote_core::table::{CREATED_AT, LAST_UPDATED};
use tote_core::timestamp::{TIME_FORMAT, date_to_days, parse_timestamp};

use super::column_index;
use crate::error::{SplitSnafu, TransformError};

/// `(source column, date column, time column)`
const CHANGE_TIME_SPLITS: [(&str, &str, &str); 2] = [
    (CREATED_AT, "created_date", "created_time"),
    (LAST_UPDATED, "last_updated_date", "last_updated_time"),
];

/// Replace both change-time columns with their date and time parts.
///
/// Each pair takes the position of the column it replaces. Dates are
/// `Date32`; times are `HH:MM:SS.ffffff` strings.
pub fn split_change_times(batch: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let mut out = batch.clone();
    for (column, date_column, time_column) in CHANGE_TIME_SPLITS {
        out = split_timestamp_column(&out, column, date_column, time_column)?;
    }
    Ok(out)
}

/// Replace `column` with a `date_column` and a `time_column` at its position.
pub fn split_timestamp_column(
    batch: &RecordBatch,
    column: &str,
    date_column: &str,
    time_column: &str,
) -> Result<RecordBatch, TransformError> {
    let position = column_index(batch, column)?;
    let values = timestamps(batch.column(position), column)?;

    let mut dates = Date32Builder::with_capacity(values.len());
    let mut times = StringBuilder::new();
    for value in &values {
        match value {
            Some(ts) => {
                dates.append_value(date_to_days(&ts.date()));
                times.append_value(ts.time().format(TIME_FORMAT).to_string());
            }
            None => {
                dates.append_null();
                times.append_null();
            }
        }
    }

    let schema = batch.schema();
    let mut fields: Vec<Arc<Field>> = Vec::with_capacity(schema.fields().len() + 1);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 1);
    for (idx, field) in schema.fields().iter().enumerate() {
        if idx == position {
            fields.push(Arc::new(Field::new(date_column, DataType::Date32, true)));
            fields.push(Arc::new(Field::new(time_column, DataType::Utf8, true)));
            columns.push(Arc::new(dates.finish()));
            columns.push(Arc::new(times.finish()));
        } else {
            fields.push(Arc::clone(field));
            columns.push(Arc::clone(batch.column(idx)));
        }
    }

    let schema = Schema::new_with_metadata(fields, schema.metadata().clone());
    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

/// Read a string or timestamp column as naive timestamps.
fn timestamps(array: &ArrayRef, column: &str) -> Result<Vec<Option<NaiveDateTime>>, TransformError> {
    match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let strings = cast(array, &DataType::Utf8)?;
            strings
                .as_string::<i32>()
                .iter()
                .map(|value| {
                    value
                        .map(parse_timestamp)
                        .transpose()
                        .context(SplitSnafu { column })
                })
                .collect()
        }
        DataType::Timestamp(_, tz) => {
            let micros = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, tz.clone()))?;
            micros
                .as_primitive::<TimestampMicrosecondType>()
                .iter()
                .map(|value| {
                    value
                        .map(|us| {
                            DateTime::from_timestamp_micros(us)
                                .map(|dt| dt.naive_utc())
                                .ok_or_else(|| TransformError::Schema {
                                    column: column.to_string(),
                                    reason: format!("timestamp {us}µs is out of range"),
                                })
                        })
                        .transpose()
                })
                .collect()
        }
        other => Err(TransformError::Schema {
            column: column.to_string(),
            reason: format!("expected a timestamp or string column, found {other}"),
        }),
    }
}
