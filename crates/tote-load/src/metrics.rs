//! Internal events for the load stage.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

use tote_core::metrics::events::InternalEvent;
use tote_core::table::TargetTable;

/// Rows committed to a warehouse table.
pub struct RowsLoaded {
    pub table: TargetTable,
    pub count: u64,
}

impl InternalEvent for RowsLoaded {
    fn emit(self) {
        trace!(table = self.table.name(), count = self.count, "Rows loaded");
        counter!("tote_load_rows_total", "table" => self.table.name()).increment(self.count);
    }
}

/// A warehouse commit finished.
pub struct WarehouseCommitCompleted {
    pub table: TargetTable,
    pub duration: Duration,
}

impl InternalEvent for WarehouseCommitCompleted {
    fn emit(self) {
        trace!(
            table = self.table.name(),
            duration_ms = self.duration.as_millis() as u64,
            "Warehouse commit completed"
        );
        histogram!("tote_load_commit_duration_seconds", "table" => self.table.name())
            .record(self.duration.as_secs_f64());
    }
}

/// An append was rolled back.
pub struct LoadRolledBack {
    pub table: TargetTable,
}

impl InternalEvent for LoadRolledBack {
    fn emit(self) {
        counter!("tote_load_rollbacks_total", "table" => self.table.name()).increment(1);
    }
}

pub struct DataFileUploaded {
    pub table: TargetTable,
    pub bytes: usize,
}

impl InternalEvent for DataFileUploaded {
    fn emit(self) {
        counter!("tote_load_data_files_total", "table" => self.table.name()).increment(1);
        counter!("tote_load_data_bytes_total", "table" => self.table.name())
            .increment(self.bytes as u64);
    }
}
