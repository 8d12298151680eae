//! Add actions and the append commit.

use std::collections::HashMap;

use deltalake::DeltaTable;
use deltalake::kernel::transaction::CommitBuilder;
use deltalake::kernel::{Action, Add};
use deltalake::protocol::{DeltaOperation, SaveMode};
use tracing::debug;

use tote_core::table::TargetTable;

use crate::error::WarehouseError;

/// A data file uploaded into the table directory but not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDataFile {
    /// Path relative to the table root.
    pub path: String,
    pub size: usize,
}

pub fn create_add_action(file: &StagedDataFile) -> Action {
    Action::Add(Add {
        path: file.path.clone(),
        size: i64::try_from(file.size).unwrap_or(i64::MAX),
        partition_values: HashMap::new(),
        modification_time: chrono::Utc::now().timestamp_millis(),
        data_change: true,
        ..Default::default()
    })
}

/// Commit `files` as one unpartitioned `Write`/`Append`.
pub async fn commit_append(
    delta: &DeltaTable,
    files: &[StagedDataFile],
    table: TargetTable,
) -> Result<i64, WarehouseError> {
    let map_err = |source: deltalake::DeltaTableError| WarehouseError::DeltaOperation {
        table: table.name().to_string(),
        source,
    };

    let actions = files.iter().map(create_add_action).collect::<Vec<_>>();
    debug!(table = table.name(), files = actions.len(), "Committing data files");

    let version = CommitBuilder::default()
        .with_actions(actions)
        .build(
            Some(delta.snapshot().map_err(map_err)?),
            delta.log_store(),
            DeltaOperation::Write {
                mode: SaveMode::Append,
                partition_by: None,
                predicate: None,
            },
        )
        .await
        .map_err(map_err)?
        .version;

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_add_action() {
        let action = create_add_action(&StagedDataFile {
            path: "part-0001.parquet".to_string(),
            size: 1024,
        });

        match action {
            Action::Add(add) => {
                assert_eq!(add.path, "part-0001.parquet");
                assert_eq!(add.size, 1024);
                assert!(add.data_change);
                assert!(add.partition_values.is_empty());
            }
            _ => panic!("Expected Add action"),
        }
    }
}
