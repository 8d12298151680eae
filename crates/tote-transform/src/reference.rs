//! Reference aggregates: the union of every staged snapshot of a table.
//!
//! Counterparty rows are enriched from `address` and staff rows from
//! `department`. Both are read fresh from the ingestion store on every
//! transform unless wrapped in a [`ReferenceCache`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use object_store::path::Path;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info};

use tote_core::DuplicatePolicy;
use tote_core::arrow::array::{Array, UInt32Array};
use tote_core::arrow::compute::{cast, concat_batches, take_record_batch};
use tote_core::arrow::record_batch::RecordBatch;
use tote_core::arrow::row::{RowConverter, SortField};
use tote_core::codec::decode_batch;
use tote_core::emit;
use tote_core::staging::PARQUET_EXTENSION;
use tote_core::storage::StorageProviderRef;
use tote_core::table::SourceTable;

use crate::error::{
    DecodeSnafu, DuplicateReferenceSnafu, ListReferenceSnafu, ReadStagedSnafu,
    ReferenceUnavailableSnafu, TransformError,
};
use crate::metrics::{ReferenceCacheHit, ReferenceLoaded};
use crate::primitives::key_rows;

/// Supplies the full reference aggregate of a table.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    async fn fetch(&self, table: SourceTable) -> Result<RecordBatch, TransformError>;
}

/// Reads every staged file under `{table}/` in the ingestion store.
pub struct StagedReferences {
    storage: StorageProviderRef,
    policy: DuplicatePolicy,
}

impl StagedReferences {
    pub fn new(storage: StorageProviderRef, policy: DuplicatePolicy) -> Self {
        Self { storage, policy }
    }
}

#[async_trait]
impl ReferenceFetcher for StagedReferences {
    async fn fetch(&self, table: SourceTable) -> Result<RecordBatch, TransformError> {
        let prefix = format!("{}/", table.name());
        let keys = self
            .storage
            .list_keys(&prefix)
            .await
            .context(ListReferenceSnafu {
                table: table.name(),
            })?;
        // Keys sort chronologically: `{table}/{date}/{time}.parquet`.
        let keys = keys
            .into_iter()
            .filter(|key| key.ends_with(&format!(".{PARQUET_EXTENSION}")))
            .collect::<Vec<_>>();

        if keys.is_empty() {
            return ReferenceUnavailableSnafu {
                table: table.name(),
            }
            .fail();
        }

        let mut batches = Vec::with_capacity(keys.len());
        for key in &keys {
            let bytes = self
                .storage
                .get(&Path::from(key.as_str()))
                .await
                .context(ReadStagedSnafu { key: key.as_str() })?;
            batches.push(decode_batch(bytes).context(DecodeSnafu { key: key.as_str() })?);
        }

        let aggregate = concat_aligned(&keys, &batches)?;
        let rows_before = aggregate.num_rows();
        let aggregate = deduplicate(table, &aggregate, self.policy)?;

        emit!(ReferenceLoaded {
            table,
            files: keys.len() as u64,
            rows: aggregate.num_rows() as u64,
        });
        info!(
            %table,
            files = keys.len(),
            rows = aggregate.num_rows(),
            duplicates = rows_before - aggregate.num_rows(),
            "Loaded reference aggregate"
        );
        Ok(aggregate)
    }
}

/// Concatenate batches after aligning each to the first batch's schema.
///
/// Columns are matched by name and cast to the first file's types.
fn concat_aligned(keys: &[String], batches: &[RecordBatch]) -> Result<RecordBatch, TransformError> {
    let schema = batches[0].schema();
    let mut aligned = Vec::with_capacity(batches.len());

    for (key, batch) in keys.iter().zip(batches) {
        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                let column = batch.column_by_name(field.name()).ok_or_else(|| {
                    TransformError::ReferenceSchema {
                        key: key.clone(),
                        reason: format!("missing column '{}'", field.name()),
                    }
                })?;
                if column.data_type() == field.data_type() {
                    Ok(Arc::clone(column))
                } else {
                    cast(column, field.data_type()).map_err(|e| TransformError::ReferenceSchema {
                        key: key.clone(),
                        reason: format!("column '{}': {e}", field.name()),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        aligned.push(RecordBatch::try_new(Arc::clone(&schema), columns)?);
    }

    Ok(concat_batches(&schema, &aligned)?)
}

/// Resolve repeated primary keys according to `policy`.
///
/// Surviving rows keep their relative order.
pub fn deduplicate(
    table: SourceTable,
    batch: &RecordBatch,
    policy: DuplicatePolicy,
) -> Result<RecordBatch, TransformError> {
    let key = table.primary_key();
    let key_type = batch
        .column_by_name(key)
        .map(|c| c.data_type().clone())
        .ok_or_else(|| crate::error::missing_column(key))?;
    let converter = RowConverter::new(vec![SortField::new(key_type.clone())])?;
    let (rows, keys) = key_rows(&converter, batch, key, &key_type)?;

    // Last position of each key, or first under `KeepFirst`.
    let mut winners: HashMap<_, usize> = HashMap::with_capacity(batch.num_rows());
    for idx in 0..batch.num_rows() {
        match winners.entry(rows.row(idx)) {
            Entry::Vacant(slot) => {
                slot.insert(idx);
            }
            Entry::Occupied(mut slot) => match policy {
                DuplicatePolicy::KeepFirst => {}
                DuplicatePolicy::KeepLast => {
                    slot.insert(idx);
                }
                DuplicatePolicy::Error => {
                    let value = tote_core::arrow::util::display::array_value_to_string(&keys, idx)?;
                    return DuplicateReferenceSnafu {
                        table: table.name(),
                        key: value,
                    }
                    .fail();
                }
            },
        }
    }

    if winners.len() == batch.num_rows() {
        return Ok(batch.clone());
    }

    let mut keep = winners.into_values().map(|idx| idx as u32).collect::<Vec<_>>();
    keep.sort_unstable();
    debug!(%table, kept = keep.len(), total = batch.num_rows(), "Dropped duplicate reference rows");
    Ok(take_record_batch(batch, &UInt32Array::from(keep))?)
}

/// Caches reference aggregates per table until invalidated.
pub struct ReferenceCache {
    inner: Arc<dyn ReferenceFetcher>,
    cached: Mutex<HashMap<SourceTable, RecordBatch>>,
}

impl ReferenceCache {
    pub fn new(inner: Arc<dyn ReferenceFetcher>) -> Self {
        Self {
            inner,
            cached: Mutex::new(HashMap::new()),
        }
    }

    /// Drop the cached aggregate of `table`; the next fetch re-reads it.
    pub fn invalidate(&self, table: SourceTable) {
        if self.lock().remove(&table).is_some() {
            debug!(%table, "Invalidated cached reference aggregate");
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SourceTable, RecordBatch>> {
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ReferenceFetcher for ReferenceCache {
    async fn fetch(&self, table: SourceTable) -> Result<RecordBatch, TransformError> {
        let cached = self.lock().get(&table).cloned();
        if let Some(batch) = cached {
            emit!(ReferenceCacheHit { table });
            return Ok(batch);
        }
        let batch = self.inner.fetch(table).await?;
        self.lock().insert(table, batch.clone());
        Ok(batch)
    }
}

/// Fixed reference batches, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticReferences {
    tables: HashMap<SourceTable, RecordBatch>,
}

impl StaticReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: SourceTable, batch: RecordBatch) -> Self {
        self.tables.insert(table, batch);
        self
    }
}

#[async_trait]
impl ReferenceFetcher for StaticReferences {
    async fn fetch(&self, table: SourceTable) -> Result<RecordBatch, TransformError> {
        self.tables
            .get(&table)
            .cloned()
            .context(ReferenceUnavailableSnafu {
                table: table.name(),
            })
    }
}
