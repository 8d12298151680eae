//! Internal events for the transform stage.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

use tote_core::metrics::events::InternalEvent;
use tote_core::table::{SourceTable, TargetTable};

/// Rows written to a processed file.
pub struct RowsTransformed {
    pub target: TargetTable,
    pub count: u64,
}

impl InternalEvent for RowsTransformed {
    fn emit(self) {
        trace!(target_table = self.target.name(), count = self.count, "Rows transformed");
        counter!("tote_transform_rows_total", "target" => self.target.name())
            .increment(self.count);
    }
}

/// Input rows an inner join discarded for lack of a match.
pub struct JoinRowsDropped {
    pub table: SourceTable,
    pub reference: SourceTable,
    pub count: u64,
}

impl InternalEvent for JoinRowsDropped {
    fn emit(self) {
        counter!(
            "tote_transform_join_rows_dropped_total",
            "table" => self.table.name(),
            "reference" => self.reference.name()
        )
        .increment(self.count);
    }
}

/// A transform produced no rows, so nothing was written.
pub struct EmptyOutputSkipped {
    pub target: TargetTable,
}

impl InternalEvent for EmptyOutputSkipped {
    fn emit(self) {
        counter!("tote_transform_empty_outputs_total", "target" => self.target.name())
            .increment(1);
    }
}

/// Wall time of one staged file, read to write.
pub struct TransformDuration {
    pub table: SourceTable,
    pub duration: Duration,
}

impl InternalEvent for TransformDuration {
    fn emit(self) {
        histogram!("tote_transform_duration_seconds", "table" => self.table.name())
            .record(self.duration.as_secs_f64());
    }
}

/// A reference aggregate was assembled from staged files.
pub struct ReferenceLoaded {
    pub table: SourceTable,
    pub files: u64,
    pub rows: u64,
}

impl InternalEvent for ReferenceLoaded {
    fn emit(self) {
        trace!(table = %self.table, files = self.files, rows = self.rows, "Reference loaded");
        counter!("tote_transform_reference_loads_total", "table" => self.table.name())
            .increment(1);
        counter!("tote_transform_reference_files_read_total", "table" => self.table.name())
            .increment(self.files);
    }
}

pub struct ReferenceCacheHit {
    pub table: SourceTable,
}

impl InternalEvent for ReferenceCacheHit {
    fn emit(self) {
        counter!("tote_transform_reference_cache_hits_total", "table" => self.table.name())
            .increment(1);
    }
}
