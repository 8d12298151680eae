//! Object storage abstraction.
//!
//! Provides a unified interface for the S3 and local filesystem backends that
//! hold staged snapshots, processed files, watermarks and warehouse tables.

mod local;
mod s3;
mod url_parser;

pub use local::LocalConfig;
pub use s3::S3Config;
pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
    pub(crate) storage_options: HashMap<String, String>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

fn record(operation: StorageOperation, status: RequestStatus, start: Instant) {
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options),
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Shorthand for [`StorageProvider::for_url_with_options`] wrapped in an `Arc`.
    pub async fn shared(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<StorageProviderRef, StorageError> {
        Ok(Arc::new(Self::for_url_with_options(url, options).await?))
    }

    /// URL identifying this store, without credentials.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Get storage options for external integrations (e.g., Delta Lake).
    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List files under a prefix (relative to the configured base prefix).
    ///
    /// Returns paths relative to the configured base prefix.
    pub fn list_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Stream<Item = Result<Path, object_store::Error>> + '_ {
        let start = Instant::now();
        let prefix = Path::from(prefix);
        let full_prefix = self.qualify_path(&prefix).into_owned();

        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        let listing = self
            .object_store
            .list(Some(&full_prefix))
            .map(move |meta| {
                meta.map(|metadata| {
                    // Strip the base prefix so callers get the same paths they write with
                    let relative: Path = metadata.location.parts().skip(key_part_count).collect();
                    relative
                })
            });

        record(StorageOperation::List, RequestStatus::Success, start);
        listing
    }

    /// All keys under `prefix`, sorted lexicographically.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .list_with_prefix(prefix)
            .map_ok(|path| path.to_string())
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;
        keys.sort();
        debug!(prefix, count = keys.len(), "Listed keys");
        Ok(keys)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = match self.object_store.get(&self.qualify_path(path)).await {
            Ok(response) => response.bytes().await,
            Err(err) => Err(err),
        };
        record(StorageOperation::Get, RequestStatus::of(&result), start);
        result.context(ObjectStoreSnafu)
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        self.put_payload_with_opts(path, payload, PutOptions::default())
            .await
    }

    /// Put a Parquet file to a path with the correct content type.
    ///
    /// Local filesystem doesn't support attributes, so they are skipped there.
    pub async fn put_parquet(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        if matches!(self.config, BackendConfig::Local(_)) {
            return self.put_payload(path, payload).await;
        }

        let opts = PutOptions {
            attributes: Attributes::from_iter([(
                Attribute::ContentType,
                AttributeValue::from("application/vnd.apache.parquet"),
            )]),
            ..Default::default()
        };
        self.put_payload_with_opts(path, payload, opts).await
    }

    async fn put_payload_with_opts(
        &self,
        path: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put_opts(&path, payload, opts).await;
        record(StorageOperation::Put, RequestStatus::of(&result), start);
        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete a file at the given path.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.delete(&path).await;
        record(StorageOperation::Delete, RequestStatus::of(&result), start);
        result.context(ObjectStoreSnafu)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn local_storage(dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        let path = Path::from("staff/2024-02-14/10:00:00.000000.parquet");
        storage
            .put_parquet(&path, PutPayload::from_static(b"PAR1"))
            .await
            .unwrap();

        let bytes = storage.get(&path).await.unwrap();
        assert_eq!(bytes.as_ref(), b"PAR1");
        assert!(
            temp_dir
                .path()
                .join("staff/2024-02-14/10:00:00.000000.parquet")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_list_keys_is_sorted_and_scoped() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        for key in [
            "address/2024-02-15/09:00:00.000000.parquet",
            "address/2024-02-14/10:00:00.000000.parquet",
            "address_archive/2024-02-14/10:00:00.000000.parquet",
        ] {
            storage
                .put_payload(&Path::from(key), PutPayload::from_static(b"x"))
                .await
                .unwrap();
        }

        let keys = storage.list_keys("address/").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "address/2024-02-14/10:00:00.000000.parquet",
                "address/2024-02-15/09:00:00.000000.parquet",
            ]
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        let err = storage.get(&Path::from("nope.txt")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;
        let path = Path::from("dim_staff/part-0.parquet");

        storage
            .put_payload(&path, PutPayload::from_static(b"x"))
            .await
            .unwrap();
        storage.delete(&path).await.unwrap();

        assert!(storage.get(&path).await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_qualify_path_with_s3_prefix() {
        let config = BackendConfig::parse_url("s3://bucket/base/dir").unwrap();
        let storage = StorageProvider {
            config,
            object_store: Arc::new(object_store::memory::InMemory::new()),
            canonical_url: "s3://bucket/base/dir".to_string(),
            storage_options: HashMap::new(),
        };
        let path = Path::from("staff/file.parquet");
        assert_eq!(
            storage.qualify_path(&path).into_owned(),
            Path::from("base/dir/staff/file.parquet")
        );
    }
}
