//! Internal events for the extraction stage.
//!
//! All events carry a `table` label with the source table name.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

use tote_core::metrics::events::InternalEvent;
use tote_core::table::SourceTable;

/// Rows returned by one capture.
pub struct RowsCaptured {
    pub table: SourceTable,
    pub count: u64,
}

impl InternalEvent for RowsCaptured {
    fn emit(self) {
        trace!(table = %self.table, count = self.count, "Rows captured");
        counter!("tote_extract_rows_captured_total", "table" => self.table.name())
            .increment(self.count);
    }
}

/// A capture found no rows newer than the watermark.
pub struct TableUnchanged {
    pub table: SourceTable,
}

impl InternalEvent for TableUnchanged {
    fn emit(self) {
        trace!(table = %self.table, "Table unchanged");
        counter!("tote_extract_tables_unchanged_total", "table" => self.table.name())
            .increment(1);
    }
}

/// A snapshot was written to the ingestion store.
pub struct SnapshotStaged {
    pub table: SourceTable,
    pub bytes: u64,
}

impl InternalEvent for SnapshotStaged {
    fn emit(self) {
        trace!(table = %self.table, bytes = self.bytes, "Snapshot staged");
        counter!("tote_extract_snapshots_staged_total", "table" => self.table.name())
            .increment(1);
        counter!("tote_extract_staged_bytes_total", "table" => self.table.name())
            .increment(self.bytes);
    }
}

/// Wall time of a single table capture, success or failure.
pub struct CaptureDuration {
    pub table: SourceTable,
    pub duration: Duration,
}

impl InternalEvent for CaptureDuration {
    fn emit(self) {
        histogram!("tote_extract_capture_duration_seconds", "table" => self.table.name())
            .record(self.duration.as_secs_f64());
    }
}

/// A capture failed and aborted the run.
pub struct CaptureFailed {
    pub table: SourceTable,
    pub class: &'static str,
}

impl InternalEvent for CaptureFailed {
    fn emit(self) {
        counter!(
            "tote_extract_capture_failures_total",
            "table" => self.table.name(),
            "class" => self.class
        )
        .increment(1);
    }
}
