//! A complete extraction: capture, stage, then advance the watermark.

use tracing::info;

use tote_core::staging::StagingKey;
use tote_core::table::SourceTable;
use tote_core::timestamp::RunTimestamp;
use tote_core::watermark::{Watermark, advance_watermark};

use crate::error::ExtractError;
use crate::orchestrator::{Orchestrator, RunOverrides};
use crate::writer::SnapshotWriter;

/// What one successful job did.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub run_timestamp: RunTimestamp,
    pub staged: Vec<StagingKey>,
    pub unchanged: Vec<SourceTable>,
}

pub struct ExtractionJob {
    orchestrator: Orchestrator,
    writer: SnapshotWriter,
}

impl ExtractionJob {
    pub fn new(orchestrator: Orchestrator, writer: SnapshotWriter) -> Self {
        Self {
            orchestrator,
            writer,
        }
    }

    /// Run one extraction.
    ///
    /// The watermark moves to the run timestamp only after every snapshot is
    /// staged; any failure before that leaves it where it was.
    pub async fn run(&self, overrides: RunOverrides) -> Result<ExtractionReport, ExtractError> {
        let extraction = self.orchestrator.run_extraction(overrides).await?;

        let mut staged = Vec::new();
        for snapshot in extraction.snapshots() {
            staged.push(self.writer.write(snapshot).await?);
        }

        advance_watermark(
            self.orchestrator.watermark_store().as_ref(),
            self.orchestrator.watermark_name(),
            Watermark::from(extraction.run_timestamp),
        )
        .await?;

        let unchanged = extraction.unchanged_tables().collect::<Vec<_>>();
        info!(
            run_timestamp = %extraction.run_timestamp,
            staged = staged.len(),
            unchanged = unchanged.len(),
            "Extraction complete"
        );

        Ok(ExtractionReport {
            run_timestamp: extraction.run_timestamp,
            staged,
            unchanged,
        })
    }
}
