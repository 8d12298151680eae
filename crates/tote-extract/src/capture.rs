//! Change capture for a single table.

use std::time::Instant;
use tracing::{debug, info, warn};

use tote_core::emit;
use tote_core::table::SourceTable;
use tote_core::timestamp::RunTimestamp;
use tote_core::watermark::Watermark;

use crate::error::{CaptureError, SourceError};
use crate::metrics::{CaptureDuration, CaptureFailed, RowsCaptured, TableUnchanged};
use crate::snapshot::Snapshot;
use crate::source::{CaptureQuery, QueryResult, SourceConnection};

/// Capture the rows of `table` changed after `watermark`.
///
/// An initial watermark selects every row. Returns `None` when nothing
/// changed, so no empty snapshot is ever produced.
pub async fn capture(
    connection: &dyn SourceConnection,
    table: SourceTable,
    watermark: &Watermark,
    run_timestamp: &RunTimestamp,
) -> Result<Option<Snapshot>, CaptureError> {
    let query = CaptureQuery {
        table,
        since: watermark.timestamp().copied(),
    };
    debug!(%table, %watermark, "Capturing table");

    let start = Instant::now();
    let result = connection.query(&query).await;
    emit!(CaptureDuration {
        table,
        duration: start.elapsed(),
    });

    let result = result.map_err(|source| {
        let err = classify(table, source);
        warn!(%table, error = %err, "Capture failed");
        emit!(CaptureFailed {
            table,
            class: failure_class(&err),
        });
        err
    })?;

    let snapshot = into_snapshot(table, run_timestamp, result).inspect_err(|err| {
        warn!(%table, error = %err, "Capture returned an unexpected shape");
        emit!(CaptureFailed {
            table,
            class: failure_class(err),
        });
    })?;

    match &snapshot {
        Some(snapshot) => {
            emit!(RowsCaptured {
                table,
                count: snapshot.num_rows() as u64,
            });
            info!(%table, rows = snapshot.num_rows(), "Captured changed rows");
        }
        None => {
            emit!(TableUnchanged { table });
            info!(%table, "No changes since watermark");
        }
    }

    Ok(snapshot)
}

fn classify(table: SourceTable, source: SourceError) -> CaptureError {
    let table = table.to_string();
    match source {
        SourceError::Programming { message } => CaptureError::Query { table, message },
        SourceError::UnsupportedType { .. } => CaptureError::Schema {
            table,
            message: source.to_string(),
        },
        SourceError::Infrastructure { .. } => CaptureError::Source { table, source },
    }
}

fn failure_class(err: &CaptureError) -> &'static str {
    match err {
        CaptureError::Query { .. } => "query",
        CaptureError::Schema { .. } => "schema",
        CaptureError::Source { .. } => "source",
    }
}

fn into_snapshot(
    table: SourceTable,
    run_timestamp: &RunTimestamp,
    result: QueryResult,
) -> Result<Option<Snapshot>, CaptureError> {
    if result.rows.is_empty() {
        return Ok(None);
    }

    let schema_error = |message: String| CaptureError::Schema {
        table: table.to_string(),
        message,
    };

    if result.columns.is_empty() {
        return Err(schema_error("result has rows but no column descriptors".into()));
    }
    if let Some(position) = result.columns.iter().position(|c| c.name.is_empty()) {
        return Err(schema_error(format!("column {position} has no name")));
    }

    Snapshot::new(table, *run_timestamp, result.columns, result.rows)
        .map(Some)
        .map_err(|e| schema_error(e.to_string()))
}
