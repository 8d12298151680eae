//! tote-extract: watermark-driven change capture.
//!
//! Captures every source table changed since the watermark, stages each
//! non-empty capture as Parquet in the ingestion store, then advances the
//! watermark to the run timestamp.

pub mod capture;
pub mod error;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod snapshot;
pub mod source;
pub mod writer;

pub use capture::capture;
pub use error::{CaptureError, ExtractError, SourceError, StagingError};
pub use job::{ExtractionJob, ExtractionReport};
pub use orchestrator::{ExtractionRun, Orchestrator, RunOverrides, TableCapture};
pub use snapshot::Snapshot;
pub use source::{
    CaptureQuery, Column, ColumnType, MemorySource, QueryResult, SourceConnection,
    SourceConnector, Value,
};
pub use writer::SnapshotWriter;
