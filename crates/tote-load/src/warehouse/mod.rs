//! Warehouse writer abstraction and scoped transactional append.
//!
//! A [`Warehouse`] hands out one [`WarehouseTransaction`] per append. The
//! transaction is consumed by `commit` or `rollback`, so it cannot outlive
//! the load that opened it. [`append_in_transaction`] is the only path the
//! load stage uses: begin, write, commit, and roll back on any failure.

mod delta;
mod memory;

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info};

use tote_core::arrow::array::RecordBatch;
use tote_core::arrow::datatypes::SchemaRef;
use tote_core::emit;
use tote_core::table::TargetTable;

use crate::error::{LoadError, WarehouseError};
use crate::metrics::{LoadRolledBack, RowsLoaded, WarehouseCommitCompleted};

pub use delta::DeltaWarehouse;
pub use memory::{FailurePoint, MemoryWarehouse};

/// A store of warehouse tables that supports all-or-nothing appends.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Open a transaction appending rows of `schema` to `table`.
    async fn begin(
        &self,
        table: TargetTable,
        schema: SchemaRef,
    ) -> Result<Box<dyn WarehouseTransaction>, WarehouseError>;
}

/// An open append. Nothing written through it is visible until `commit`.
#[async_trait]
pub trait WarehouseTransaction: Send {
    async fn write(&mut self, batch: &RecordBatch) -> Result<(), WarehouseError>;

    /// Make every write visible atomically. Returns the new table version.
    async fn commit(self: Box<Self>) -> Result<i64, WarehouseError>;

    /// Discard every write.
    async fn rollback(self: Box<Self>) -> Result<(), WarehouseError>;
}

/// Outcome of a committed append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReceipt {
    pub table: TargetTable,
    pub rows: usize,
    pub version: i64,
}

/// Append `batch` to `table` in a single transaction.
///
/// A failed write is rolled back and its error returned. A failed commit
/// leaves nothing visible. Rollback failures are logged; the error that
/// caused the rollback is the one returned.
pub async fn append_in_transaction(
    warehouse: &dyn Warehouse,
    table: TargetTable,
    batch: &RecordBatch,
) -> Result<LoadReceipt, LoadError> {
    let start = Instant::now();
    let rows = batch.num_rows();

    let mut transaction = warehouse
        .begin(table, batch.schema())
        .await
        .map_err(|source| warehouse_error(table, source))?;
    debug!(table = table.name(), rows, "Opened warehouse transaction");

    if let Err(source) = transaction.write(batch).await {
        error!(table = table.name(), error = %source, "Warehouse write failed, rolling back");
        if let Err(rollback) = transaction.rollback().await {
            error!(table = table.name(), error = %rollback, "Rollback failed");
        }
        emit!(LoadRolledBack { table });
        return Err(warehouse_error(table, source));
    }

    let version = match transaction.commit().await {
        Ok(version) => version,
        Err(source) => {
            error!(table = table.name(), error = %source, "Warehouse commit failed");
            emit!(LoadRolledBack { table });
            return Err(warehouse_error(table, source));
        }
    };

    emit!(WarehouseCommitCompleted {
        table,
        duration: start.elapsed(),
    });
    emit!(RowsLoaded {
        table,
        count: rows as u64,
    });
    info!(table = table.name(), rows, version, "Appended rows to warehouse");

    Ok(LoadReceipt {
        table,
        rows,
        version,
    })
}

fn warehouse_error(table: TargetTable, source: WarehouseError) -> LoadError {
    LoadError::Warehouse {
        table: table.name().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tote_core::arrow::array::{Int64Array, StringArray};
    use tote_core::arrow::datatypes::{DataType, Field, Schema};

    fn currency_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("currency_id", DataType::Int64, false),
            Field::new("currency_code", DataType::Utf8, false),
            Field::new("currency_name", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["GBP", "USD"])),
                Arc::new(StringArray::from(vec!["British Pound", "US Dollar"])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_append_commits_batch() {
        let warehouse = MemoryWarehouse::new();
        let receipt = append_in_transaction(&warehouse, TargetTable::DimCurrency, &currency_batch())
            .await
            .unwrap();

        assert_eq!(receipt.rows, 2);
        assert_eq!(receipt.version, 1);
        assert_eq!(warehouse.row_count(TargetTable::DimCurrency), 2);
        assert_eq!(warehouse.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_versions_increase_per_commit() {
        let warehouse = MemoryWarehouse::new();
        let batch = currency_batch();
        append_in_transaction(&warehouse, TargetTable::DimCurrency, &batch)
            .await
            .unwrap();
        let second = append_in_transaction(&warehouse, TargetTable::DimCurrency, &batch)
            .await
            .unwrap();

        assert_eq!(second.version, 2);
        assert_eq!(warehouse.row_count(TargetTable::DimCurrency), 4);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let warehouse = MemoryWarehouse::new().with_failure(FailurePoint::Write);
        let err = append_in_transaction(&warehouse, TargetTable::DimCurrency, &currency_batch())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Warehouse { ref table, .. } if table == "dim_currency"));
        assert_eq!(warehouse.row_count(TargetTable::DimCurrency), 0);
        assert_eq!(warehouse.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_nothing_visible() {
        let warehouse = MemoryWarehouse::new().with_failure(FailurePoint::Commit);
        let err = append_in_transaction(&warehouse, TargetTable::FactPayment, &currency_batch())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::Warehouse {
                source: WarehouseError::Rejected { .. },
                ..
            }
        ));
        assert_eq!(warehouse.row_count(TargetTable::FactPayment), 0);
    }

    #[tokio::test]
    async fn test_failed_begin_touches_nothing() {
        let warehouse = MemoryWarehouse::new().with_failure(FailurePoint::Begin);
        assert!(
            append_in_transaction(&warehouse, TargetTable::DimCurrency, &currency_batch())
                .await
                .is_err()
        );
        assert_eq!(warehouse.rollbacks(), 0);
    }
}
