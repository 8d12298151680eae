//! Pipeline configuration.
//!
//! All three stages read the same YAML file; each stage validates the
//! sections it needs. Environment variables are interpolated before parsing.
//!
//! ```yaml
//! staging:
//!   ingestion_url: s3://ingestion-zone
//!   processed_url: s3://processed-zone
//! watermark:
//!   parameter: last_ingested_timestamp
//! source:
//!   credentials_secret: db_credentials
//!   max_concurrent_captures: 4
//! secrets:
//!   dir: /etc/tote/secrets
//! transform:
//!   duplicate_policy: keep_last
//! warehouse:
//!   root_url: s3://warehouse
//! metrics:
//!   address: 0.0.0.0:9090
//! ```

mod vars;

pub use vars::interpolate;

use clap::Args;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};
use crate::secrets::{EnvSecretStore, FileSecretStore, SecretStore};
use crate::table::SourceTable;

/// Upper bound on concurrent captures: one per source table.
pub const MAX_CONCURRENT_CAPTURES: usize = SourceTable::ALL.len();

/// Config-file argument shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "TOTE_CONFIG")]
    pub config: PathBuf,
}

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false)
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub staging: StagingConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Object stores holding raw and transformed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingConfig {
    /// Raw snapshots written by extraction.
    pub ingestion_url: String,
    /// Dimension and fact files written by the transform stage.
    pub processed_url: String,
    /// Storage options (credentials, region, endpoint) for both stores.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatermarkConfig {
    /// Name of the watermark parameter.
    #[serde(default = "default_watermark_parameter")]
    pub parameter: String,
    /// Store holding the parameter. Defaults to the ingestion store.
    #[serde(default)]
    pub store_url: Option<String>,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            parameter: default_watermark_parameter(),
            store_url: None,
        }
    }
}

fn default_watermark_parameter() -> String {
    "last_ingested_timestamp".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Secret holding the source database credentials.
    #[serde(default = "default_credentials_secret")]
    pub credentials_secret: String,
    /// Captures issued at once; 1 runs tables one after another.
    #[serde(default = "default_max_concurrent_captures")]
    pub max_concurrent_captures: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            credentials_secret: default_credentials_secret(),
            max_concurrent_captures: default_max_concurrent_captures(),
        }
    }
}

fn default_credentials_secret() -> String {
    "db_credentials".to_string()
}

fn default_max_concurrent_captures() -> usize {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretsConfig {
    /// Directory of `{name}.json` secrets. When unset, secrets come from
    /// `TOTE_SECRET_<NAME>` environment variables.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl SecretsConfig {
    pub fn store(&self) -> Box<dyn SecretStore> {
        match &self.dir {
            Some(dir) => Box::new(FileSecretStore::new(dir)),
            None => Box::new(EnvSecretStore::new()),
        }
    }
}

/// What to do when a reference key appears in more than one staged file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The row from the earliest file wins.
    KeepFirst,
    /// The row from the latest file wins.
    #[default]
    KeepLast,
    /// Fail the transform.
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

/// Delta Lake warehouse location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    /// Root URL; each warehouse table lives at `{root_url}/{table}`.
    pub root_url: String,
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Listen address; no exporter is started when unset.
    #[serde(default)]
    pub address: Option<String>,
}

impl PipelineConfig {
    /// Read, interpolate, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !is_yaml_file(path) {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::parse(&contents)
    }

    /// Interpolate, parse and validate YAML contents.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let contents = interpolate(contents)?;
        let config: Self = serde_yaml::from_str(&contents).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let non_empty = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(ConfigError::EmptyUrl {
                    field: field.to_string(),
                })
            } else {
                Ok(())
            }
        };

        non_empty("staging.ingestion_url", &self.staging.ingestion_url)?;
        non_empty("staging.processed_url", &self.staging.processed_url)?;
        if let Some(url) = &self.watermark.store_url {
            non_empty("watermark.store_url", url)?;
        }
        if let Some(warehouse) = &self.warehouse {
            non_empty("warehouse.root_url", &warehouse.root_url)?;
        }

        let concurrency = self.source.max_concurrent_captures;
        if concurrency == 0 || concurrency > MAX_CONCURRENT_CAPTURES {
            return Err(ConfigError::InvalidConcurrency {
                value: concurrency,
                max: MAX_CONCURRENT_CAPTURES,
            });
        }
        Ok(())
    }

    /// Store URL of the watermark parameter.
    pub fn watermark_store_url(&self) -> &str {
        self.watermark
            .store_url
            .as_deref()
            .unwrap_or(&self.staging.ingestion_url)
    }

    /// The warehouse section, required by the load stage.
    pub fn require_warehouse(&self) -> Result<&WarehouseConfig, ConfigError> {
        self.warehouse
            .as_ref()
            .ok_or_else(|| ConfigError::MissingSection {
                section: "warehouse".to_string(),
            })
    }
}
