//! In-process warehouse for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use tote_core::arrow::array::RecordBatch;
use tote_core::arrow::datatypes::SchemaRef;
use tote_core::table::TargetTable;

use super::{Warehouse, WarehouseTransaction};
use crate::error::WarehouseError;

/// Step at which a [`MemoryWarehouse`] refuses to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Begin,
    Write,
    Commit,
}

#[derive(Debug, Default)]
struct TableState {
    batches: Vec<RecordBatch>,
    version: i64,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<HashMap<TargetTable, TableState>>,
    rollbacks: AtomicUsize,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, HashMap<TargetTable, TableState>> {
        // A poisoned lock only means a test panicked mid-commit; the map is still usable.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps committed batches in memory, per table.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    shared: Arc<Shared>,
    failure: Option<FailurePoint>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every transaction at `point`.
    pub fn with_failure(mut self, point: FailurePoint) -> Self {
        self.failure = Some(point);
        self
    }

    /// Batches committed to `table`, in commit order.
    pub fn committed(&self, table: TargetTable) -> Vec<RecordBatch> {
        self.shared
            .tables()
            .get(&table)
            .map(|state| state.batches.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: TargetTable) -> usize {
        self.committed(table).iter().map(RecordBatch::num_rows).sum()
    }

    /// Number of transactions rolled back so far.
    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }
}

fn rejected(operation: &str, table: TargetTable) -> WarehouseError {
    WarehouseError::Rejected {
        operation: operation.to_string(),
        table: table.name().to_string(),
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn begin(
        &self,
        table: TargetTable,
        schema: SchemaRef,
    ) -> Result<Box<dyn WarehouseTransaction>, WarehouseError> {
        if self.failure == Some(FailurePoint::Begin) {
            return Err(rejected("begin", table));
        }
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            table,
            schema,
            pending: Vec::new(),
            failure: self.failure,
        }))
    }
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    table: TargetTable,
    schema: SchemaRef,
    pending: Vec<RecordBatch>,
    failure: Option<FailurePoint>,
}

#[async_trait]
impl WarehouseTransaction for MemoryTransaction {
    async fn write(&mut self, batch: &RecordBatch) -> Result<(), WarehouseError> {
        if self.failure == Some(FailurePoint::Write) {
            return Err(rejected("write", self.table));
        }
        if batch.schema() != self.schema {
            return Err(WarehouseError::SchemaMismatch {
                table: self.table.name().to_string(),
                message: "batch schema differs from the transaction schema".to_string(),
            });
        }
        self.pending.push(batch.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<i64, WarehouseError> {
        if self.failure == Some(FailurePoint::Commit) {
            return Err(rejected("commit", self.table));
        }
        let MemoryTransaction {
            shared,
            table,
            pending,
            ..
        } = *self;
        let mut tables = shared.tables();
        let state = tables.entry(table).or_default();
        state.batches.extend(pending);
        state.version += 1;
        Ok(state.version)
    }

    async fn rollback(self: Box<Self>) -> Result<(), WarehouseError> {
        self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
