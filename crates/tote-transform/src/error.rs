//! Error types for the transform stage.

use snafu::prelude::*;

use tote_core::arrow::error::ArrowError;
pub use tote_core::error::{
    CodecError, ConfigError, EventError, MetricsError, ParseError, RoutingError, StorageError,
};

/// Top-level transform errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// The storage event could not be read.
    #[snafu(display("Invalid storage event: {source}"))]
    Event { source: EventError },

    /// The object key is not a staging key.
    #[snafu(display("{source}"))]
    StagingKey { source: ParseError },

    /// The table has no warehouse target.
    #[snafu(display("Routing failed: {source}"))]
    Routing { source: RoutingError },

    /// A column the rule needs is missing or has an unusable type.
    #[snafu(display("Schema mismatch on column '{column}': {reason}"))]
    Schema { column: String, reason: String },

    /// A change-time value could not be split into date and time.
    #[snafu(display("Cannot split column '{column}': {source}"))]
    Split { column: String, source: ParseError },

    /// A value has no entry in the lookup table.
    #[snafu(display("No lookup entry for code '{code}'"))]
    Lookup { code: String },

    /// An Arrow kernel failed.
    #[snafu(display("Arrow compute failed: {source}"))]
    Compute { source: ArrowError },

    /// No staged files exist for a reference table.
    #[snafu(display("Reference table '{table}' has no staged files"))]
    ReferenceUnavailable { table: String },

    /// A reference key appears more than once and the policy forbids it.
    #[snafu(display("Reference table '{table}' holds key {key} more than once"))]
    DuplicateReference { table: String, key: String },

    /// Staged files of a reference table have incompatible columns.
    #[snafu(display("Staged file {key} does not match the reference schema: {reason}"))]
    ReferenceSchema { key: String, reason: String },

    /// Listing reference files failed.
    #[snafu(display("Failed to list staged files for '{table}': {source}"))]
    ListReference { table: String, source: StorageError },

    /// Reading a staged file failed.
    #[snafu(display("Failed to read {key}: {source}"))]
    ReadStaged { key: String, source: StorageError },

    /// Writing a processed file failed.
    #[snafu(display("Failed to write {key}: {source}"))]
    WriteProcessed { key: String, source: StorageError },

    /// A staged file is not valid Parquet.
    #[snafu(display("Failed to decode {key}: {source}"))]
    Decode { key: String, source: CodecError },

    /// The output batch could not be encoded.
    #[snafu(display("Failed to encode {key}: {source}"))]
    Encode { key: String, source: CodecError },

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

impl From<ArrowError> for TransformError {
    fn from(source: ArrowError) -> Self {
        TransformError::Compute { source }
    }
}

impl From<RoutingError> for TransformError {
    fn from(source: RoutingError) -> Self {
        TransformError::Routing { source }
    }
}

impl From<EventError> for TransformError {
    fn from(source: EventError) -> Self {
        TransformError::Event { source }
    }
}

impl From<ConfigError> for TransformError {
    fn from(source: ConfigError) -> Self {
        TransformError::Config { source }
    }
}

impl From<StorageError> for TransformError {
    fn from(source: StorageError) -> Self {
        TransformError::Storage { source }
    }
}

impl From<MetricsError> for TransformError {
    fn from(source: MetricsError) -> Self {
        TransformError::Metrics { source }
    }
}

/// Missing-column error for `column`.
pub(crate) fn missing_column(column: &str) -> TransformError {
    TransformError::Schema {
        column: column.to_string(),
        reason: "column not present in input".to_string(),
    }
}
