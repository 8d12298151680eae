//! Delta Lake warehouse.
//!
//! Each warehouse table is a Delta table at `{root_url}/{table}`. A
//! transaction opens (or creates) the table, uploads one Parquet data file
//! per written batch into the table directory, and publishes them all in a
//! single `Write`/`Append` commit. Until that commit the files are not part
//! of the table; rollback deletes them.

mod commit;
mod table;

use std::collections::HashMap;

use async_trait::async_trait;
use object_store::PutPayload;
use object_store::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use tote_core::arrow::array::RecordBatch;
use tote_core::arrow::datatypes::SchemaRef;
use tote_core::codec::encode_batch;
use tote_core::emit;
use tote_core::storage::{StorageProvider, StorageProviderRef};
use tote_core::table::TargetTable;

use super::{Warehouse, WarehouseTransaction};
use crate::error::WarehouseError;
use crate::metrics::DataFileUploaded;

use commit::{StagedDataFile, commit_append};
use table::{check_table_schema, ensure_handlers_registered, open_or_create_table};

/// Warehouse of Delta tables under one root location.
#[derive(Debug, Clone)]
pub struct DeltaWarehouse {
    root_url: String,
    storage_options: HashMap<String, String>,
}

impl DeltaWarehouse {
    pub fn new(root_url: impl Into<String>, storage_options: HashMap<String, String>) -> Self {
        ensure_handlers_registered();
        Self {
            root_url: root_url.into(),
            storage_options,
        }
    }

    /// Location of `table` under the root.
    pub fn table_url(&self, table: TargetTable) -> String {
        format!("{}/{}", self.root_url.trim_end_matches('/'), table.name())
    }
}

#[async_trait]
impl Warehouse for DeltaWarehouse {
    async fn begin(
        &self,
        table: TargetTable,
        schema: SchemaRef,
    ) -> Result<Box<dyn WarehouseTransaction>, WarehouseError> {
        let storage = StorageProvider::shared(&self.table_url(table), self.storage_options.clone())
            .await
            .map_err(|source| WarehouseError::TableStorage { source })?;
        let delta = open_or_create_table(&storage, &schema, table).await?;
        check_table_schema(&delta, &schema, table)?;

        Ok(Box::new(DeltaTransaction {
            table,
            delta,
            storage,
            schema,
            staged: Vec::new(),
            finished: false,
        }))
    }
}

struct DeltaTransaction {
    table: TargetTable,
    delta: deltalake::DeltaTable,
    storage: StorageProviderRef,
    schema: SchemaRef,
    staged: Vec<StagedDataFile>,
    finished: bool,
}

impl DeltaTransaction {
    /// Delete every uploaded file. Attempts all deletes and reports the first failure.
    async fn discard_staged(&mut self) -> Result<(), WarehouseError> {
        let mut first_error = None;
        for file in self.staged.drain(..) {
            debug!(table = self.table.name(), path = %file.path, "Discarding data file");
            if let Err(source) = self.storage.delete(&Path::from(file.path.as_str())).await {
                warn!(table = self.table.name(), path = %file.path, error = %source, "Failed to discard data file");
                first_error.get_or_insert(WarehouseError::Discard {
                    path: file.path,
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl WarehouseTransaction for DeltaTransaction {
    async fn write(&mut self, batch: &RecordBatch) -> Result<(), WarehouseError> {
        if batch.schema() != self.schema {
            return Err(WarehouseError::SchemaMismatch {
                table: self.table.name().to_string(),
                message: "batch schema differs from the transaction schema".to_string(),
            });
        }

        let bytes = encode_batch(batch).map_err(|source| WarehouseError::EncodeData {
            table: self.table.name().to_string(),
            source,
        })?;
        let size = bytes.len();
        let path = format!("part-{}.parquet", Uuid::now_v7());

        self.storage
            .put_parquet(&Path::from(path.as_str()), PutPayload::from(bytes))
            .await
            .map_err(|source| WarehouseError::Upload {
                path: path.clone(),
                source,
            })?;

        emit!(DataFileUploaded {
            table: self.table,
            bytes: size,
        });
        debug!(table = self.table.name(), %path, size, rows = batch.num_rows(), "Uploaded data file");
        self.staged.push(StagedDataFile { path, size });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<i64, WarehouseError> {
        if self.staged.is_empty() {
            self.finished = true;
            return Ok(self.delta.version().unwrap_or(-1));
        }

        match commit_append(&self.delta, &self.staged, self.table).await {
            Ok(version) => {
                self.staged.clear();
                self.finished = true;
                Ok(version)
            }
            Err(commit_error) => {
                if let Err(discard_error) = self.discard_staged().await {
                    warn!(table = self.table.name(), error = %discard_error, "Cleanup after failed commit was incomplete");
                }
                self.finished = true;
                Err(commit_error)
            }
        }
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), WarehouseError> {
        let result = self.discard_staged().await;
        self.finished = true;
        result
    }
}

impl Drop for DeltaTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.staged.is_empty() {
            warn!(
                table = self.table.name(),
                files = self.staged.len(),
                "Transaction dropped without commit or rollback; uploaded data files are orphaned"
            );
        }
    }
}
