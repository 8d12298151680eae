//! Column-level building blocks shared by the transform rules.
//!
//! Every primitive takes its input by reference and returns a new batch.
//! Arrow arrays are immutable and reference counted, so unchanged columns are
//! shared with the input rather than copied.

mod currency;
mod join;
mod split;

pub use currency::{CURRENCY_NAME, add_currency_names, currency_name};
pub use join::{JoinOn, JoinOutput, inner_join, key_rows};
pub use split::{split_change_times, split_timestamp_column};

use std::sync::Arc;

use tote_core::arrow::datatypes::{Field, Schema};
use tote_core::arrow::record_batch::RecordBatch;
use tote_core::table::{CREATED_AT, LAST_UPDATED};

use crate::error::{TransformError, missing_column};

/// Position of `name` in the batch schema.
pub fn column_index(batch: &RecordBatch, name: &str) -> Result<usize, TransformError> {
    batch
        .schema()
        .index_of(name)
        .map_err(|_| missing_column(name))
}

/// Keep only `columns`, in the given order.
pub fn project_columns(batch: &RecordBatch, columns: &[&str]) -> Result<RecordBatch, TransformError> {
    let indices = columns
        .iter()
        .map(|name| column_index(batch, name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(batch.project(&indices)?)
}

/// Remove `columns`. Every named column must exist.
pub fn drop_columns(batch: &RecordBatch, columns: &[&str]) -> Result<RecordBatch, TransformError> {
    for name in columns {
        column_index(batch, name)?;
    }
    let schema = batch.schema();
    let keep = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| !columns.contains(&field.name().as_str()))
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    Ok(batch.project(&keep)?)
}

/// Remove the `created_at` and `last_updated` columns.
pub fn drop_change_times(batch: &RecordBatch) -> Result<RecordBatch, TransformError> {
    drop_columns(batch, &[CREATED_AT, LAST_UPDATED])
}

/// Rename columns by `(from, to)` pairs. Every `from` column must exist.
pub fn rename_columns(
    batch: &RecordBatch,
    renames: &[(&str, &str)],
) -> Result<RecordBatch, TransformError> {
    for (from, _) in renames {
        column_index(batch, from)?;
    }

    let schema = batch.schema();
    let fields = schema
        .fields()
        .iter()
        .map(|field| {
            match renames.iter().find(|(from, _)| field.name() == from) {
                Some((_, to)) => Arc::new(field.as_ref().clone().with_name(*to)),
                None => Arc::clone(field),
            }
        })
        .collect::<Vec<Arc<Field>>>();

    let schema = Schema::new_with_metadata(fields, schema.metadata().clone());
    Ok(RecordBatch::try_new(Arc::new(schema), batch.columns().to_vec())?)
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use tote_core::arrow::array::{ArrayRef, Int64Array, StringArray};
    use tote_core::arrow::datatypes::{DataType, Field, Schema};
    use tote_core::arrow::record_batch::RecordBatch;

    /// Column builder for test batches.
    pub enum Col<'a> {
        Int(&'a str, Vec<Option<i64>>),
        Str(&'a str, Vec<Option<&'a str>>),
    }

    pub fn batch(columns: Vec<Col<'_>>) -> RecordBatch {
        let mut fields = Vec::new();
        let mut arrays: Vec<ArrayRef> = Vec::new();
        for column in columns {
            match column {
                Col::Int(name, values) => {
                    fields.push(Field::new(name, DataType::Int64, true));
                    arrays.push(Arc::new(Int64Array::from(values)));
                }
                Col::Str(name, values) => {
                    fields.push(Field::new(name, DataType::Utf8, true));
                    arrays.push(Arc::new(StringArray::from(values)));
                }
            }
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    pub fn names(batch: &RecordBatch) -> Vec<String> {
        batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn strings(batch: &RecordBatch, column: &str) -> Vec<Option<String>> {
        use tote_core::arrow::array::{Array, AsArray};
        let array = batch.column_by_name(column).unwrap().as_string::<i32>();
        (0..array.len())
            .map(|i| (!array.is_null(i)).then(|| array.value(i).to_string()))
            .collect()
    }

    pub fn ints(batch: &RecordBatch, column: &str) -> Vec<Option<i64>> {
        use tote_core::arrow::array::AsArray;
        use tote_core::arrow::datatypes::Int64Type;
        batch
            .column_by_name(column)
            .unwrap()
            .as_primitive::<Int64Type>()
            .iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    fn design() -> RecordBatch {
        batch(vec![
            Col::Int("design_id", vec![Some(8), Some(51)]),
            Col::Str("created_at", vec![Some("2022-11-03 14:20:49.962000"); 2]),
            Col::Str("design_name", vec![Some("Wooden"), Some("Bronze")]),
            Col::Str("last_updated", vec![Some("2022-11-03 14:20:49.962000"); 2]),
        ])
    }

    #[test]
    fn test_drop_change_times() {
        let out = drop_change_times(&design()).unwrap();
        assert_eq!(names(&out), vec!["design_id", "design_name"]);
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn test_drop_missing_column_is_schema_error() {
        let input = drop_change_times(&design()).unwrap();
        let err = drop_change_times(&input).unwrap_err();
        assert!(matches!(err, TransformError::Schema { ref column, .. } if column == "created_at"));
    }

    #[test]
    fn test_rename_keeps_position() {
        let out = rename_columns(&design(), &[("design_id", "id")]).unwrap();
        assert_eq!(
            names(&out),
            vec!["id", "created_at", "design_name", "last_updated"]
        );
        assert_eq!(ints(&out, "id"), vec![Some(8), Some(51)]);
    }

    #[test]
    fn test_project_orders_columns() {
        let out = project_columns(&design(), &["design_name", "design_id"]).unwrap();
        assert_eq!(names(&out), vec!["design_name", "design_id"]);
        assert!(project_columns(&design(), &["file_location"]).is_err());
    }

    #[test]
    fn test_input_is_not_mutated() {
        let input = design();
        let _ = rename_columns(&input, &[("design_id", "id")]).unwrap();
        let _ = drop_change_times(&input).unwrap();
        assert_eq!(input, design());
    }
}
