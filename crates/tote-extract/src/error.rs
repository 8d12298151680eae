//! Error types for the extraction stage.

use snafu::prelude::*;

pub use tote_core::error::{
    CodecError, ConfigError, MetricsError, ParseError, SecretError, StorageError,
    ValidationError, WatermarkError,
};

/// Failures reported by a source connection.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// The source rejected the query itself (syntax, missing relation, permissions).
    #[snafu(display("Source rejected query: {message}"))]
    Programming { message: String },

    /// Connectivity, authentication, timeouts and everything else.
    #[snafu(display("Source failure: {message}"))]
    Infrastructure { message: String },

    /// A column whose type has no snapshot representation.
    #[snafu(display("Column '{column}' has unsupported type '{type_name}'"))]
    UnsupportedType { column: String, type_name: String },
}

/// Capture failures, one variant per class callers must tell apart.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CaptureError {
    /// Malformed query against the source.
    #[snafu(display("Query for table '{table}' failed: {message}"))]
    Query { table: String, message: String },

    /// Result shape violates expectations.
    #[snafu(display("Unexpected result shape for table '{table}': {message}"))]
    Schema { table: String, message: String },

    /// Infrastructure failure while capturing.
    #[snafu(display("Capture of table '{table}' failed: {source}"))]
    Source { table: String, source: SourceError },
}

/// Errors writing snapshots to the staging store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StagingError {
    /// Snapshot columns could not be converted to a record batch.
    #[snafu(display("Snapshot for '{table}' cannot be staged: {message}"))]
    SnapshotSchema { table: String, message: String },

    /// Parquet encoding failed.
    #[snafu(display("Failed to encode snapshot for '{table}': {source}"))]
    SnapshotEncode { table: String, source: CodecError },

    /// Object store write failed.
    #[snafu(display("Failed to write staged file {key}: {source}"))]
    SnapshotWrite { key: String, source: StorageError },
}

/// Top-level extraction errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExtractError {
    /// A table capture failed; the run is aborted.
    #[snafu(display("{source}"))]
    Capture { source: CaptureError },

    /// A capture task died without reporting a result.
    #[snafu(display("Capture task for '{table}' failed: {source}"))]
    Orchestration {
        table: String,
        source: tokio::task::JoinError,
    },

    /// Opening the source connection failed.
    #[snafu(display("Failed to connect to source: {source}"))]
    Connect { source: SourceError },

    /// Staging write failed.
    #[snafu(display("Staging error: {source}"))]
    Staging { source: StagingError },

    /// Watermark read or advance failed.
    #[snafu(display("Watermark error: {source}"))]
    Watermark { source: WatermarkError },

    /// Override value could not be parsed.
    #[snafu(display("Invalid override: {source}"))]
    Override { source: ParseError },

    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Secret lookup failed.
    #[snafu(display("Secret error: {source}"))]
    Secret { source: SecretError },

    /// Storage setup failed.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Metrics exporter failed to start.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

impl From<CaptureError> for ExtractError {
    fn from(source: CaptureError) -> Self {
        ExtractError::Capture { source }
    }
}

impl From<StagingError> for ExtractError {
    fn from(source: StagingError) -> Self {
        ExtractError::Staging { source }
    }
}

impl From<WatermarkError> for ExtractError {
    fn from(source: WatermarkError) -> Self {
        ExtractError::Watermark { source }
    }
}

impl From<ConfigError> for ExtractError {
    fn from(source: ConfigError) -> Self {
        ExtractError::Config { source }
    }
}

impl From<SecretError> for ExtractError {
    fn from(source: SecretError) -> Self {
        ExtractError::Secret { source }
    }
}

impl From<StorageError> for ExtractError {
    fn from(source: StorageError) -> Self {
        ExtractError::Storage { source }
    }
}

impl From<MetricsError> for ExtractError {
    fn from(source: MetricsError) -> Self {
        ExtractError::Metrics { source }
    }
}
