//! Captured table snapshots.

use std::sync::Arc;

use rust_decimal::Decimal;

use tote_core::arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Decimal128Builder, Float64Builder, Int64Builder,
    StringBuilder, TimestampMicrosecondBuilder,
};
use tote_core::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use tote_core::arrow::record_batch::RecordBatch;
use tote_core::error::ValidationError;
use tote_core::staging::StagingKey;
use tote_core::table::SourceTable;
use tote_core::timestamp::{RunTimestamp, date_to_days};

use crate::error::StagingError;
use crate::source::{Column, ColumnType, Value};

/// One table's changed rows from one run.
///
/// Always holds at least one row and every row has one value per column; a
/// capture with no rows is represented by the absence of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    table: SourceTable,
    run_timestamp: RunTimestamp,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Snapshot {
    pub fn new(
        table: SourceTable,
        run_timestamp: RunTimestamp,
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, ValidationError> {
        if rows.is_empty() {
            return Err(ValidationError::EmptyBatch {
                what: format!("snapshot of '{table}'"),
            });
        }
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(ValidationError::RaggedRow {
                row,
                expected: columns.len(),
                actual: values.len(),
            });
        }

        Ok(Self {
            table,
            run_timestamp,
            columns,
            rows,
        })
    }

    pub fn table(&self) -> SourceTable {
        self.table
    }

    pub fn run_timestamp(&self) -> &RunTimestamp {
        &self.run_timestamp
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// `{table}/{date}/{time}.parquet`
    pub fn staging_key(&self) -> StagingKey {
        StagingKey::new(self.table.name(), &self.run_timestamp)
    }

    /// Convert to an Arrow batch.
    ///
    /// Every column takes the Arrow type matching its declared source type,
    /// so an all-null column is typed the same as a populated one.
    pub fn to_record_batch(&self) -> Result<RecordBatch, StagingError> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays = Vec::with_capacity(self.columns.len());

        for (idx, column) in self.columns.iter().enumerate() {
            let cells: Vec<&Value> = self.rows.iter().map(|row| &row[idx]).collect();
            let array =
                build_column(column, &cells).map_err(|message| StagingError::SnapshotSchema {
                    table: self.table.to_string(),
                    message,
                })?;
            fields.push(Field::new(&column.name, arrow_type(column.column_type), true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        RecordBatch::try_new(schema, arrays).map_err(|e| StagingError::SnapshotSchema {
            table: self.table.to_string(),
            message: e.to_string(),
        })
    }
}

/// Arrow type a source column is staged as.
fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Bool => DataType::Boolean,
        ColumnType::Int => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Decimal { precision, scale } => DataType::Decimal128(precision, scale),
        ColumnType::Text => DataType::Utf8,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        ColumnType::Date => DataType::Date32,
    }
}

/// `value` as an integer count of `10^-scale` units, if it fits exactly.
fn decimal_units(value: &Decimal, scale: i8) -> Option<i128> {
    let scale = u32::try_from(scale).ok()?;
    let value = value.normalize();
    let shift = scale.checked_sub(value.scale())?;
    value.mantissa().checked_mul(10i128.checked_pow(shift)?)
}

macro_rules! typed_column {
    ($builder:expr, $cells:expr, $column:expr, $variant:pat => $value:expr) => {{
        let mut builder = $builder;
        for cell in $cells {
            match cell {
                Value::Null => builder.append_null(),
                $variant => builder.append_value($value),
                other => {
                    return Err(format!(
                        "column '{}' is declared {} but holds a {} value",
                        $column.name,
                        $column.column_type,
                        other.kind()
                    ));
                }
            }
        }
        Arc::new(builder.finish()) as ArrayRef
    }};
}

fn build_column(column: &Column, cells: &[&Value]) -> Result<ArrayRef, String> {
    let capacity = cells.len();

    let array = match column.column_type {
        ColumnType::Bool => {
            typed_column!(BooleanBuilder::with_capacity(capacity), cells, column, Value::Bool(b) => *b)
        }
        ColumnType::Int => {
            typed_column!(Int64Builder::with_capacity(capacity), cells, column, Value::Int(i) => *i)
        }
        ColumnType::Float => {
            typed_column!(Float64Builder::with_capacity(capacity), cells, column, Value::Float(f) => *f)
        }
        ColumnType::Text => {
            typed_column!(StringBuilder::new(), cells, column, Value::Text(s) => s)
        }
        ColumnType::Timestamp => typed_column!(
            TimestampMicrosecondBuilder::with_capacity(capacity),
            cells,
            column,
            Value::Timestamp(ts) => ts.and_utc().timestamp_micros()
        ),
        ColumnType::Date => typed_column!(
            Date32Builder::with_capacity(capacity),
            cells,
            column,
            Value::Date(d) => date_to_days(d)
        ),
        ColumnType::Decimal { precision, scale } => {
            let mut units = Vec::with_capacity(capacity);
            for cell in cells {
                match cell {
                    Value::Null => units.push(None),
                    Value::Decimal(d) => {
                        let Some(unit) = decimal_units(d, scale) else {
                            return Err(format!(
                                "column '{}' value {d} does not fit {}",
                                column.name, column.column_type
                            ));
                        };
                        units.push(Some(unit));
                    }
                    other => {
                        return Err(format!(
                            "column '{}' is declared {} but holds a {} value",
                            column.name,
                            column.column_type,
                            other.kind()
                        ));
                    }
                }
            }
            let mut builder = Decimal128Builder::with_capacity(capacity)
                .with_precision_and_scale(precision, scale)
                .map_err(|e| e.to_string())?;
            builder.extend(units);
            let array = builder.finish();
            array
                .validate_decimal_precision(precision)
                .map_err(|e| format!("column '{}': {e}", column.name))?;
            Arc::new(array) as ArrayRef
        }
    };

    Ok(array)
}
