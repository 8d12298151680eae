//! Inner hash join on a single key column.

use std::collections::HashMap;
use std::sync::Arc;

use tote_core::arrow::array::{Array, ArrayRef, UInt32Array};
use tote_core::arrow::compute::{cast, take_record_batch};
use tote_core::arrow::datatypes::{Field, Schema};
use tote_core::arrow::record_batch::RecordBatch;
use tote_core::arrow::row::{RowConverter, Rows, SortField};

use super::column_index;
use crate::error::TransformError;

/// Suffix for right-hand columns whose names collide with left-hand ones.
pub const RIGHT_SUFFIX: &str = "_ref";

/// Join keys: `left.{left} = right.{right}`.
#[derive(Debug, Clone, Copy)]
pub struct JoinOn<'a> {
    pub left: &'a str,
    pub right: &'a str,
}

impl<'a> JoinOn<'a> {
    /// Same column name on both sides.
    pub fn column(name: &'a str) -> Self {
        Self {
            left: name,
            right: name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinOutput {
    pub batch: RecordBatch,
    /// Left rows without any match on the right.
    pub unmatched_left: usize,
}

/// Row-encode `column` of `batch` so keys of different arrays compare by value.
///
/// The column is cast to `as_type` first, letting an `Int32` key match an
/// `Int64` one.
pub fn key_rows(
    converter: &RowConverter,
    batch: &RecordBatch,
    column: &str,
    as_type: &tote_core::arrow::datatypes::DataType,
) -> Result<(Rows, ArrayRef), TransformError> {
    let array = batch.column(column_index(batch, column)?);
    let array = if array.data_type() == as_type {
        Arc::clone(array)
    } else {
        cast(array, as_type).map_err(|e| TransformError::Schema {
            column: column.to_string(),
            reason: format!("key type {} is not comparable: {e}", array.data_type()),
        })?
    };
    let rows = converter.convert_columns(&[Arc::clone(&array)])?;
    Ok((rows, array))
}

/// Inner join `left` with `right`.
///
/// Output columns are every left column followed by every right column; when
/// both keys share a name the right key is omitted, and any other right column
/// whose name is already taken gets [`RIGHT_SUFFIX`]. Rows come out in left
/// order, with multiple matches in right order. Null keys never match.
pub fn inner_join(
    left: &RecordBatch,
    right: &RecordBatch,
    on: JoinOn<'_>,
) -> Result<JoinOutput, TransformError> {
    let key_type = left.column(column_index(left, on.left)?).data_type().clone();
    let right_key_idx = column_index(right, on.right)?;

    let converter = RowConverter::new(vec![SortField::new(key_type.clone())])?;
    let (right_rows, right_keys) = key_rows(&converter, right, on.right, &key_type)?;
    let (left_rows, left_keys) = key_rows(&converter, left, on.left, &key_type)?;

    let mut index: HashMap<_, Vec<u32>> = HashMap::with_capacity(right.num_rows());
    for idx in 0..right.num_rows() {
        if right_keys.is_valid(idx) {
            index.entry(right_rows.row(idx)).or_default().push(idx as u32);
        }
    }

    let mut left_take = Vec::new();
    let mut right_take = Vec::new();
    let mut unmatched_left = 0;
    for idx in 0..left.num_rows() {
        let matches = left_keys
            .is_valid(idx)
            .then(|| index.get(&left_rows.row(idx)))
            .flatten();
        match matches {
            Some(matches) => {
                for &right_idx in matches {
                    left_take.push(idx as u32);
                    right_take.push(right_idx);
                }
            }
            None => unmatched_left += 1,
        }
    }

    let left_out = take_record_batch(left, &UInt32Array::from(left_take))?;
    let right_out = take_record_batch(right, &UInt32Array::from(right_take))?;

    let left_schema = left.schema();
    let right_schema = right.schema();
    let mut fields: Vec<Arc<Field>> = left_schema.fields().iter().cloned().collect();
    let mut columns: Vec<ArrayRef> = left_out.columns().to_vec();

    for (idx, field) in right_schema.fields().iter().enumerate() {
        if idx == right_key_idx && on.left == on.right {
            continue;
        }
        let field = if left_schema.index_of(field.name()).is_ok() {
            Arc::new(
                field
                    .as_ref()
                    .clone()
                    .with_name(format!("{}{RIGHT_SUFFIX}", field.name())),
            )
        } else {
            Arc::clone(field)
        };
        fields.push(field);
        columns.push(Arc::clone(right_out.column(idx)));
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    Ok(JoinOutput {
        batch,
        unmatched_left,
    })
}
