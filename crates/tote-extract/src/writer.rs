//! Writes snapshots to the ingestion store.

use object_store::PutPayload;
use snafu::ResultExt;
use tracing::{debug, info};

use tote_core::codec::encode_batch;
use tote_core::emit;
use tote_core::staging::StagingKey;
use tote_core::storage::StorageProviderRef;

use crate::error::{SnapshotEncodeSnafu, SnapshotWriteSnafu, StagingError};
use crate::metrics::SnapshotStaged;
use crate::snapshot::Snapshot;

/// Stages snapshots as Parquet under `{table}/{date}/{time}.parquet`.
pub struct SnapshotWriter {
    storage: StorageProviderRef,
}

impl SnapshotWriter {
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    pub async fn write(&self, snapshot: &Snapshot) -> Result<StagingKey, StagingError> {
        let table = snapshot.table();
        let key = snapshot.staging_key();

        let batch = snapshot.to_record_batch()?;
        let bytes = encode_batch(&batch).context(SnapshotEncodeSnafu {
            table: table.to_string(),
        })?;
        let size = bytes.len() as u64;
        debug!(%table, %key, bytes = size, "Encoded snapshot");

        self.storage
            .put_parquet(&key.to_path(), PutPayload::from(bytes))
            .await
            .context(SnapshotWriteSnafu {
                key: key.to_string(),
            })?;

        emit!(SnapshotStaged { table, bytes: size });
        info!(%table, %key, rows = snapshot.num_rows(), "Staged snapshot");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Column, ColumnType, Value};
    use object_store::path::Path;
    use tempfile::TempDir;
    use tote_core::codec::decode_batch;
    use tote_core::storage::StorageProvider;
    use tote_core::table::SourceTable;
    use tote_core::timestamp::RunTimestamp;

    #[tokio::test]
    async fn test_write_snapshot() {
        let temp = TempDir::new().unwrap();
        let storage = StorageProvider::shared(temp.path().to_str().unwrap(), Default::default())
            .await
            .unwrap();
        let writer = SnapshotWriter::new(storage.clone());

        let snapshot = Snapshot::new(
            SourceTable::Staff,
            RunTimestamp::parse("2024-02-14 10:00:00.000000").unwrap(),
            vec![
                Column::new("staff_id", ColumnType::Int),
                Column::new("first_name", ColumnType::Text),
            ],
            vec![
                vec![Value::Int(1), Value::Text("Jeremie".into())],
                vec![Value::Int(2), Value::Text("Deron".into())],
            ],
        )
        .unwrap();

        let key = writer.write(&snapshot).await.unwrap();
        assert_eq!(key.to_string(), "staff/2024-02-14/10:00:00.000000.parquet");

        let bytes = storage
            .get(&Path::from("staff/2024-02-14/10:00:00.000000.parquet"))
            .await
            .unwrap();
        let batch = decode_batch(bytes).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(1).name(), "first_name");
    }
}
