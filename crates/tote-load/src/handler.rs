//! Load one processed file per storage event.

use std::sync::Arc;

use snafu::ResultExt;
use tracing::{debug, info};

use tote_core::codec::decode_batch;
use tote_core::error::ValidationError;
use tote_core::event::parse_event;
use tote_core::staging::StagingKey;
use tote_core::storage::StorageProviderRef;
use tote_core::table::TargetTable;

use crate::error::{DecodeSnafu, LoadError, ReadProcessedSnafu, StagingKeySnafu};
use crate::warehouse::{LoadReceipt, Warehouse, append_in_transaction};

/// Appends processed files to the warehouse table named by their key.
pub struct LoadHandler {
    processed: StorageProviderRef,
    warehouse: Arc<dyn Warehouse>,
}

impl LoadHandler {
    pub fn new(processed: StorageProviderRef, warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            processed,
            warehouse,
        }
    }

    pub async fn handle_event(&self, payload: &str) -> Result<LoadReceipt, LoadError> {
        let object = parse_event(payload)?;
        if let Some(bucket) = &object.bucket {
            debug!(bucket, key = %object.key, "Received storage event");
        }
        self.handle_key(&object.key).await
    }

    /// Load the processed file at `key` into the table its first segment names.
    pub async fn handle_key(&self, key: &str) -> Result<LoadReceipt, LoadError> {
        let key = StagingKey::parse(key).context(StagingKeySnafu)?;
        let table: TargetTable = key.table().parse()?;
        info!(%key, table = table.name(), "Loading processed file");

        let bytes = self
            .processed
            .get(&key.to_path())
            .await
            .context(ReadProcessedSnafu {
                key: key.to_string(),
            })?;
        let batch = decode_batch(bytes).context(DecodeSnafu {
            key: key.to_string(),
        })?;

        if batch.num_rows() == 0 {
            return Err(ValidationError::EmptyBatch {
                what: key.to_string(),
            }
            .into());
        }

        append_in_transaction(self.warehouse.as_ref(), table, &batch).await
    }
}
