//! tote-core: shared building blocks for the extract, transform and load stages.
//!
//! - `table` - closed set of source tables and their warehouse routing
//! - `staging` - `{table}/{date}/{time}.parquet` staging keys
//! - `timestamp` - the microsecond timestamp format every stage agrees on
//! - `storage` - object storage abstraction (S3, local filesystem)
//! - `codec` - Parquet encoding of Arrow record batches
//! - `watermark` - change-time high-water mark and its stores
//! - `secrets` - secret stores and database credentials
//! - `event` - storage-event notification parsing
//! - `config` - YAML configuration with environment interpolation
//! - `metrics` - Prometheus metrics and the `emit!` macro
//! - `error` - common error types

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod secrets;
pub mod staging;
pub mod storage;
pub mod table;
pub mod timestamp;
pub mod tracing;
pub mod watermark;

// Re-export commonly used items
pub use codec::{decode_batch, encode_batch};
pub use config::{ConfigArgs, DuplicatePolicy, PipelineConfig};
pub use error::{
    CodecError, ConfigError, EventError, MetricsError, ParseError, RoutingError, SecretError,
    StorageError, ValidationError, WatermarkError,
};
pub use event::{ObjectRef, parse_event};
pub use secrets::{DbCredentials, EnvSecretStore, FileSecretStore, SecretStore};
pub use staging::{StagingKey, unescape_key};
pub use storage::{StorageProvider, StorageProviderRef};
pub use table::{SourceTable, TargetTable, resolve_target};
pub use timestamp::{RunTimestamp, format_timestamp, parse_timestamp};
pub use crate::tracing::init_tracing;
pub use watermark::{MemoryWatermarkStore, StorageWatermarkStore, Watermark, WatermarkStore};

/// Re-exported so stage crates share one Arrow/Parquet version with the warehouse.
pub use deltalake::{arrow, parquet};
