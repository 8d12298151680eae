//! Transform one staged file per storage event.

use std::sync::Arc;
use std::time::Instant;

use object_store::PutPayload;
use snafu::ResultExt;
use tracing::{debug, info, warn};

use tote_core::codec::{decode_batch, encode_batch};
use tote_core::emit;
use tote_core::event::parse_event;
use tote_core::staging::StagingKey;
use tote_core::storage::StorageProviderRef;
use tote_core::table::{SourceTable, TargetTable};

use crate::error::{
    DecodeSnafu, EncodeSnafu, ReadStagedSnafu, StagingKeySnafu, TransformError,
    WriteProcessedSnafu,
};
use crate::metrics::{EmptyOutputSkipped, RowsTransformed, TransformDuration};
use crate::reference::{ReferenceCache, ReferenceFetcher};
use crate::rules::transform;

/// Result of handling one staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The processed file was written under `key`.
    Written {
        key: StagingKey,
        target: TargetTable,
        rows: usize,
    },
    /// The rule produced no rows; nothing was written.
    Empty { target: TargetTable },
}

/// Reads raw snapshots from the ingestion store and writes dimension and
/// fact files to the processed store.
pub struct TransformHandler {
    ingestion: StorageProviderRef,
    processed: StorageProviderRef,
    references: Arc<ReferenceCache>,
}

impl TransformHandler {
    pub fn new(
        ingestion: StorageProviderRef,
        processed: StorageProviderRef,
        references: Arc<ReferenceCache>,
    ) -> Self {
        Self {
            ingestion,
            processed,
            references,
        }
    }

    /// Handle a storage-event notification for a staged snapshot.
    pub async fn handle_event(&self, payload: &str) -> Result<TransformOutcome, TransformError> {
        let object = parse_event(payload)?;
        if let Some(bucket) = &object.bucket {
            debug!(bucket, key = %object.key, "Received storage event");
        }
        self.handle_key(&object.key).await
    }

    /// Transform the staged snapshot at `key`.
    ///
    /// The table is routed before anything is read, so an unknown or
    /// reference-only table fails without writing.
    pub async fn handle_key(&self, key: &str) -> Result<TransformOutcome, TransformError> {
        let start = Instant::now();
        let key = StagingKey::parse(key).context(StagingKeySnafu)?;
        let table: SourceTable = key.table().parse()?;

        // A new partition of a reference table makes its cached aggregate stale.
        if matches!(table, SourceTable::Address | SourceTable::Department) {
            self.references.invalidate(table);
        }

        let target = table.target()?;
        info!(%key, %table, target = target.name(), "Transforming staged snapshot");

        let bytes = self
            .ingestion
            .get(&key.to_path())
            .await
            .context(ReadStagedSnafu {
                key: key.to_string(),
            })?;
        let raw = decode_batch(bytes).context(DecodeSnafu {
            key: key.to_string(),
        })?;

        let references: &dyn ReferenceFetcher = self.references.as_ref();
        let output = transform(table, &raw, references).await?;

        emit!(TransformDuration {
            table,
            duration: start.elapsed(),
        });

        if output.num_rows() == 0 {
            warn!(%key, target = target.name(), "Transform produced no rows; nothing written");
            emit!(EmptyOutputSkipped { target });
            return Ok(TransformOutcome::Empty { target });
        }

        let out_key = key.with_table(target.name());
        let encoded = encode_batch(&output).context(EncodeSnafu {
            key: out_key.to_string(),
        })?;
        self.processed
            .put_parquet(&out_key.to_path(), PutPayload::from(encoded))
            .await
            .context(WriteProcessedSnafu {
                key: out_key.to_string(),
            })?;

        let rows = output.num_rows();
        emit!(RowsTransformed {
            target,
            count: rows as u64,
        });
        info!(key = %out_key, rows, "Wrote processed file");

        Ok(TransformOutcome::Written {
            key: out_key,
            target,
            rows,
        })
    }
}
