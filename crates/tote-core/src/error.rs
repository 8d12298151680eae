//! Common error types shared by the extract, transform and load stages.
//!
//! Storage, configuration, metrics, codec, secret and watermark failures live
//! here, together with the cross-stage taxonomy members: [`ParseError`],
//! [`RoutingError`] and [`ValidationError`].

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A required URL setting is empty.
    #[snafu(display("Configuration field '{field}' cannot be empty"))]
    EmptyUrl { field: String },

    /// Capture concurrency outside the supported range.
    #[snafu(display("max_concurrent_captures must be between 1 and {max}, got {value}"))]
    InvalidConcurrency { value: usize, max: usize },

    /// A stage needs a config section that is missing.
    #[snafu(display("Configuration section '{section}' is required for this stage"))]
    MissingSection { section: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to parse the exporter listen address.
    #[snafu(display("Invalid metrics address '{address}': {source}"))]
    MetricsAddress {
        address: String,
        source: std::net::AddrParseError,
    },

    /// Failed to install the Prometheus exporter.
    #[snafu(display("Failed to initialize Prometheus exporter"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Parse Errors ============

/// Malformed timestamps and structured strings.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParseError {
    /// Timestamp does not match `YYYY-MM-DD HH:MM:SS[.ffffff]`.
    #[snafu(display("Malformed timestamp '{value}': expected YYYY-MM-DD HH:MM:SS.ffffff"))]
    TimestampFormat { value: String },

    /// Staging key does not match `{table}/{date}/{time}.{ext}`.
    #[snafu(display("Malformed staging key '{key}': {reason}"))]
    StagingKeyFormat { key: String, reason: String },

    /// Storage event payload is not valid notification JSON.
    #[snafu(display("Malformed storage event payload: {source}"))]
    EventPayload { source: serde_json::Error },
}

// ============ Routing Errors ============

/// Table names that cannot be routed to a warehouse table.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum RoutingError {
    /// Name outside the closed set of known tables.
    #[snafu(display("Unknown table '{name}'"))]
    UnknownTable { name: String },

    /// Table only exists as a reference aggregate and is never staged as a target.
    #[snafu(display("Table '{table}' is reference-only and has no warehouse target"))]
    ReferenceOnly { table: String },
}

// ============ Validation Errors ============

/// Inputs with the wrong shape for the operation they were passed to.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum ValidationError {
    /// A batch with no rows where rows are required.
    #[snafu(display("Empty input: {what} has no rows"))]
    EmptyBatch { what: String },

    /// A row whose arity differs from the column count.
    #[snafu(display("Row {row} has {actual} values but there are {expected} columns"))]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A storage event without any records.
    #[snafu(display("Storage event contains no records"))]
    EmptyEventRecords,
}

// ============ Event Errors ============

/// Errors from reading a storage-event notification.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EventError {
    #[snafu(display("{source}"))]
    MalformedEvent { source: ParseError },

    #[snafu(display("{source}"))]
    InvalidEvent { source: ValidationError },
}

// ============ Codec Errors ============

/// Errors from encoding or decoding staged Parquet files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    /// Failed to write Parquet.
    #[snafu(display("Failed to encode Parquet: {source}"))]
    ParquetEncode {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Failed to read Parquet.
    #[snafu(display("Failed to decode Parquet: {source}"))]
    ParquetDecode {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Arrow failed while assembling batches.
    #[snafu(display("Failed to assemble record batch: {source}"))]
    ArrowBatch {
        source: deltalake::arrow::error::ArrowError,
    },

    /// Refused to encode an empty batch.
    #[snafu(display("{source}"))]
    EmptyInput { source: ValidationError },
}

// ============ Secret Errors ============

/// Errors from the secret store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SecretError {
    /// No secret with this name.
    #[snafu(display("Secret '{name}' not found"))]
    SecretNotFound { name: String },

    /// Secret exists but could not be read.
    #[snafu(display("Failed to read secret '{name}': {source}"))]
    SecretRead {
        name: String,
        source: std::io::Error,
    },

    /// Secret is not a flat JSON object.
    #[snafu(display("Secret '{name}' is not a JSON object of strings: {source}"))]
    SecretParse {
        name: String,
        source: serde_json::Error,
    },

    /// A credential key is missing from the secret.
    #[snafu(display("Secret '{name}' is missing key '{key}'"))]
    MissingSecretKey { name: String, key: String },
}

// ============ Watermark Errors ============

/// Errors from reading or advancing the watermark.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WatermarkError {
    /// Underlying storage failed.
    #[snafu(display("Watermark '{name}' storage failure: {source}"))]
    WatermarkStorage { name: String, source: StorageError },

    /// Stored value is not a timestamp or the sentinel.
    #[snafu(display("Watermark value is invalid: {source}"))]
    WatermarkParse { source: ParseError },

    /// Stored bytes are not UTF-8.
    #[snafu(display("Watermark '{name}' is not valid UTF-8"))]
    WatermarkEncoding {
        name: String,
        source: std::string::FromUtf8Error,
    },

    /// Refused to move the watermark backwards.
    #[snafu(display("Refusing to move watermark back from {current} to {proposed}"))]
    WatermarkRegression { current: String, proposed: String },

    /// Parameter exists and overwrite was not requested.
    #[snafu(display("Watermark '{name}' already exists"))]
    WatermarkExists { name: String },
}
