//! Error types for the load stage.

use chrono::NaiveDate;
use snafu::prelude::*;

use tote_core::arrow::error::ArrowError;
pub use tote_core::error::{
    CodecError, ConfigError, EventError, MetricsError, ParseError, RoutingError, StorageError,
    ValidationError,
};

/// Failures inside a warehouse adapter.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// The table location is not a valid URL.
    #[snafu(display("Failed to parse warehouse table URL: {url}"))]
    UrlParse { url: String },

    /// Delta Lake operation failed.
    #[snafu(display("Delta Lake operation on '{table}' failed: {source}"))]
    DeltaOperation {
        table: String,
        source: deltalake::DeltaTableError,
    },

    /// An Arrow type has no Delta equivalent.
    #[snafu(display("Failed to convert schema: {source}"))]
    SchemaConversion { source: ArrowError },

    #[snafu(display("Failed to build table schema: {message}"))]
    StructType { message: String },

    /// Incoming columns disagree with the table.
    #[snafu(display("Schema mismatch for '{table}': {message}"))]
    SchemaMismatch { table: String, message: String },

    /// Encoding a data file failed.
    #[snafu(display("Failed to encode data file for '{table}': {source}"))]
    EncodeData { table: String, source: CodecError },

    /// Uploading a data file failed.
    #[snafu(display("Failed to upload {path}: {source}"))]
    Upload { path: String, source: StorageError },

    /// Removing an uploaded data file during rollback failed.
    #[snafu(display("Failed to remove {path} during rollback: {source}"))]
    Discard { path: String, source: StorageError },

    /// Opening the table's storage failed.
    #[snafu(display("Warehouse storage error: {source}"))]
    TableStorage { source: StorageError },

    /// The backend refused the operation.
    #[snafu(display("Warehouse rejected {operation} on '{table}': {message}"))]
    Rejected {
        operation: String,
        table: String,
        message: String,
    },
}

/// Top-level load errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// The storage event could not be read.
    #[snafu(display("Invalid storage event: {source}"))]
    Event { source: EventError },

    /// The object key is not a processed-file key.
    #[snafu(display("{source}"))]
    StagingKey { source: ParseError },

    /// The key does not name a warehouse table.
    #[snafu(display("Routing failed: {source}"))]
    Routing { source: RoutingError },

    /// The processed batch cannot be loaded as is.
    #[snafu(display("Invalid input: {source}"))]
    Validation { source: ValidationError },

    /// Reading a processed file failed.
    #[snafu(display("Failed to read {key}: {source}"))]
    ReadProcessed { key: String, source: StorageError },

    /// A processed file is not valid Parquet.
    #[snafu(display("Failed to decode {key}: {source}"))]
    Decode { key: String, source: CodecError },

    /// The append was rolled back.
    #[snafu(display("Load into '{table}' failed: {source}"))]
    Warehouse {
        table: String,
        source: WarehouseError,
    },

    /// The calendar range is inverted.
    #[snafu(display("Calendar start {start} is after end {end}"))]
    DateRange { start: NaiveDate, end: NaiveDate },

    /// An Arrow kernel failed.
    #[snafu(display("Arrow compute failed: {source}"))]
    Compute { source: ArrowError },

    /// Reading the event file failed.
    #[snafu(display("Failed to read event from {path}: {source}"))]
    EventInput {
        path: String,
        source: std::io::Error,
    },

    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage setup failed.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Metrics exporter failed to start.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

impl From<EventError> for LoadError {
    fn from(source: EventError) -> Self {
        LoadError::Event { source }
    }
}

impl From<RoutingError> for LoadError {
    fn from(source: RoutingError) -> Self {
        LoadError::Routing { source }
    }
}

impl From<ValidationError> for LoadError {
    fn from(source: ValidationError) -> Self {
        LoadError::Validation { source }
    }
}

impl From<ArrowError> for LoadError {
    fn from(source: ArrowError) -> Self {
        LoadError::Compute { source }
    }
}

impl From<ConfigError> for LoadError {
    fn from(source: ConfigError) -> Self {
        LoadError::Config { source }
    }
}

impl From<StorageError> for LoadError {
    fn from(source: StorageError) -> Self {
        LoadError::Storage { source }
    }
}

impl From<MetricsError> for LoadError {
    fn from(source: MetricsError) -> Self {
        LoadError::Metrics { source }
    }
}
