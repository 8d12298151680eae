//! Watermark stores.
//!
//! A store is a named string parameter: `get(name)` and
//! `set(name, value, overwrite)`. A parameter that was never written reads as
//! the `"None"` sentinel.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::emit;
use crate::error::{
    WatermarkEncodingSnafu, WatermarkError, WatermarkExistsSnafu, WatermarkParseSnafu,
    WatermarkRegressionSnafu, WatermarkStorageSnafu,
};
use crate::metrics::events::WatermarkAdvanced;
use crate::storage::StorageProviderRef;

use super::{INITIAL_SENTINEL, Watermark};

/// Named string parameter store holding the watermark.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Current value, `"None"` when unset.
    async fn get(&self, name: &str) -> Result<String, WatermarkError>;

    /// Write a value. With `overwrite == false` an existing value is an error.
    async fn set(&self, name: &str, value: &str, overwrite: bool) -> Result<(), WatermarkError>;
}

/// Read and parse the watermark.
pub async fn load_watermark(
    store: &dyn WatermarkStore,
    name: &str,
) -> Result<Watermark, WatermarkError> {
    let raw = store.get(name).await?;
    Watermark::parse(&raw).context(WatermarkParseSnafu)
}

/// Move the watermark forward to `next`.
///
/// Rejects any value that would move it backwards, leaving the stored value
/// untouched.
pub async fn advance_watermark(
    store: &dyn WatermarkStore,
    name: &str,
    next: Watermark,
) -> Result<(), WatermarkError> {
    let current = load_watermark(store, name).await?;
    if !current.can_advance_to(&next) {
        warn!(name, %current, proposed = %next, "Refusing watermark regression");
        return WatermarkRegressionSnafu {
            current: current.to_string(),
            proposed: next.to_string(),
        }
        .fail();
    }

    store.set(name, &next.to_string(), true).await?;

    if let Some(ts) = next.timestamp() {
        emit!(WatermarkAdvanced {
            name: name.to_string(),
            epoch_seconds: ts.and_utc().timestamp_micros() as f64 / 1_000_000.0,
        });
    }
    info!(name, from = %current, to = %next, "Watermark advanced");
    Ok(())
}

/// Watermark parameters stored as small text objects, one per name, under a
/// prefix of an object store.
pub struct StorageWatermarkStore {
    storage: StorageProviderRef,
    prefix: String,
}

impl StorageWatermarkStore {
    pub const DEFAULT_PREFIX: &'static str = "_watermarks";

    pub fn new(storage: StorageProviderRef) -> Self {
        Self::with_prefix(storage, Self::DEFAULT_PREFIX)
    }

    pub fn with_prefix(storage: StorageProviderRef, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    fn path(&self, name: &str) -> Path {
        Path::from(format!("{}/{}", self.prefix, name))
    }
}

#[async_trait]
impl WatermarkStore for StorageWatermarkStore {
    async fn get(&self, name: &str) -> Result<String, WatermarkError> {
        match self.storage.get(&self.path(name)).await {
            Ok(bytes) => {
                let value = String::from_utf8(bytes.to_vec())
                    .context(WatermarkEncodingSnafu { name })?;
                Ok(value.trim().to_string())
            }
            Err(e) if e.is_not_found() => Ok(INITIAL_SENTINEL.to_string()),
            Err(source) => Err(source).context(WatermarkStorageSnafu { name }),
        }
    }

    async fn set(&self, name: &str, value: &str, overwrite: bool) -> Result<(), WatermarkError> {
        let path = self.path(name);
        if !overwrite {
            match self.storage.get(&path).await {
                Ok(_) => return WatermarkExistsSnafu { name }.fail(),
                Err(e) if e.is_not_found() => {}
                Err(source) => return Err(source).context(WatermarkStorageSnafu { name }),
            }
        }

        let payload = PutPayload::from(Bytes::from(value.to_string()));
        self.storage
            .put_payload(&path, payload)
            .await
            .context(WatermarkStorageSnafu { name })
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one value.
    pub fn with_value(name: &str, value: &str) -> Self {
        let store = Self::default();
        if let Ok(mut values) = store.values.lock() {
            values.insert(name.to_string(), value.to_string());
        }
        store
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn get(&self, name: &str) -> Result<String, WatermarkError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values
            .get(name)
            .cloned()
            .unwrap_or_else(|| INITIAL_SENTINEL.to_string()))
    }

    async fn set(&self, name: &str, value: &str, overwrite: bool) -> Result<(), WatermarkError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if !overwrite && values.contains_key(name) {
            return WatermarkExistsSnafu { name }.fail();
        }
        values.insert(name.to_string(), value.to_string());
        Ok(())
    }
}
