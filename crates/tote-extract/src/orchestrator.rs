//! Extraction orchestrator.
//!
//! Runs one capture per source table with a shared watermark and run
//! timestamp, resolved once before fan-out. Captures run on a `JoinSet`
//! bounded by a semaphore; results come back in the fixed table order.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::ResultExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use tote_core::table::SourceTable;
use tote_core::timestamp::RunTimestamp;
use tote_core::watermark::{Watermark, WatermarkStore, load_watermark};

use crate::capture::capture;
use crate::error::{ConnectSnafu, ExtractError, OrchestrationSnafu};
use crate::snapshot::Snapshot;
use crate::source::{SourceConnection, SourceConnector};

/// Explicit inputs that take precedence over the stored or generated defaults.
#[derive(Default)]
pub struct RunOverrides {
    pub watermark: Option<Watermark>,
    pub run_timestamp: Option<RunTimestamp>,
    pub connection: Option<Arc<dyn SourceConnection>>,
}

/// Outcome of capturing one table.
#[derive(Debug, Clone)]
pub struct TableCapture {
    pub table: SourceTable,
    /// `None` when nothing changed since the watermark.
    pub snapshot: Option<Snapshot>,
}

/// Every table's capture from one run.
#[derive(Debug, Clone)]
pub struct ExtractionRun {
    pub run_timestamp: RunTimestamp,
    pub watermark: Watermark,
    /// One entry per source table, in capture order.
    pub captures: Vec<TableCapture>,
}

impl ExtractionRun {
    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.captures.iter().filter_map(|c| c.snapshot.as_ref())
    }

    pub fn unchanged_tables(&self) -> impl Iterator<Item = SourceTable> + '_ {
        self.captures
            .iter()
            .filter(|c| c.snapshot.is_none())
            .map(|c| c.table)
    }
}

pub struct Orchestrator {
    watermark_store: Arc<dyn WatermarkStore>,
    watermark_name: String,
    connector: Arc<dyn SourceConnector>,
    max_concurrent_captures: usize,
}

impl Orchestrator {
    pub fn new(
        watermark_store: Arc<dyn WatermarkStore>,
        watermark_name: impl Into<String>,
        connector: Arc<dyn SourceConnector>,
    ) -> Self {
        Self {
            watermark_store,
            watermark_name: watermark_name.into(),
            connector,
            max_concurrent_captures: 1,
        }
    }

    /// Captures allowed in flight at once. Values below 1 are treated as 1.
    pub fn with_max_concurrent_captures(mut self, limit: usize) -> Self {
        self.max_concurrent_captures = limit.max(1);
        self
    }

    pub fn watermark_store(&self) -> &Arc<dyn WatermarkStore> {
        &self.watermark_store
    }

    pub fn watermark_name(&self) -> &str {
        &self.watermark_name
    }

    /// Capture every source table.
    ///
    /// Does not touch the stored watermark; advancing it is up to the caller
    /// once every snapshot is durably staged. The first failing table aborts
    /// the run and the remaining captures are cancelled.
    pub async fn run_extraction(
        &self,
        overrides: RunOverrides,
    ) -> Result<ExtractionRun, ExtractError> {
        let watermark = match overrides.watermark {
            Some(watermark) => watermark,
            None => load_watermark(self.watermark_store.as_ref(), &self.watermark_name).await?,
        };
        let run_timestamp = overrides.run_timestamp.unwrap_or_else(RunTimestamp::now);
        let connection = match overrides.connection {
            Some(connection) => connection,
            None => self.connector.connect().await.context(ConnectSnafu)?,
        };

        info!(
            %watermark,
            %run_timestamp,
            concurrency = self.max_concurrent_captures,
            "Starting extraction run"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_captures));
        let mut tasks: JoinSet<(usize, Result<Option<Snapshot>, ExtractError>)> = JoinSet::new();
        let mut task_tables = HashMap::new();

        for (idx, table) in SourceTable::ALL.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let connection = Arc::clone(&connection);

            let handle = tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;
                let result = capture(connection.as_ref(), table, &watermark, &run_timestamp)
                    .await
                    .map_err(ExtractError::from);
                (idx, result)
            });
            task_tables.insert(handle.id(), table);
        }

        let mut slots: Vec<Option<Option<Snapshot>>> = vec![None; SourceTable::ALL.len()];
        while let Some(joined) = tasks.join_next().await {
            let (idx, result) = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let table = task_tables
                        .get(&join_error.id())
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    error!(table = %table, error = %join_error, "Capture task failed");
                    tasks.abort_all();
                    return Err(join_error).context(OrchestrationSnafu { table });
                }
            };

            let table = SourceTable::ALL[idx];
            match result {
                Ok(snapshot) => {
                    debug!(%table, "Capture finished");
                    slots[idx] = Some(snapshot);
                }
                Err(err) => {
                    error!(%table, error = %err, "Aborting extraction run");
                    tasks.abort_all();
                    return Err(err);
                }
            }
        }

        let captures = SourceTable::ALL
            .into_iter()
            .zip(slots)
            .map(|(table, slot)| TableCapture {
                table,
                snapshot: slot.flatten(),
            })
            .collect::<Vec<_>>();

        let changed = captures.iter().filter(|c| c.snapshot.is_some()).count();
        info!(%run_timestamp, changed, "Extraction run captured all tables");

        Ok(ExtractionRun {
            run_timestamp,
            watermark,
            captures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CaptureError, SourceError};
    use crate::source::{ColumnType, MemorySource, Value};
    use tote_core::timestamp::parse_timestamp;
    use tote_core::watermark::MemoryWatermarkStore;

    const NAME: &str = "last_ingested_timestamp";

    fn populated() -> MemorySource {
        let source = MemorySource::new();
        for table in SourceTable::ALL {
            source.insert_table(
                table,
                &[
                    (table.primary_key(), ColumnType::Int),
                    ("last_updated", ColumnType::Timestamp),
                ],
                vec![
                    vec![
                        Value::Int(1),
                        Value::Timestamp(parse_timestamp("2022-11-03 14:20:49.962").unwrap()),
                    ],
                    vec![
                        Value::Int(2),
                        Value::Timestamp(parse_timestamp("2024-02-14 12:00:00").unwrap()),
                    ],
                ],
            );
        }
        source
    }

    fn orchestrator(source: &MemorySource, store: MemoryWatermarkStore) -> Orchestrator {
        Orchestrator::new(Arc::new(store), NAME, Arc::new(source.clone()))
    }

    #[tokio::test]
    async fn test_all_snapshots_share_run_timestamp() {
        let source = populated();
        let run = RunTimestamp::parse("2024-02-15 09:00:00.000000").unwrap();
        let extraction = orchestrator(&source, MemoryWatermarkStore::new())
            .with_max_concurrent_captures(4)
            .run_extraction(RunOverrides {
                run_timestamp: Some(run),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(extraction.run_timestamp, run);
        assert_eq!(extraction.snapshots().count(), SourceTable::ALL.len());
        assert!(extraction.snapshots().all(|s| s.run_timestamp() == &run));

        let order: Vec<_> = extraction.captures.iter().map(|c| c.table).collect();
        assert_eq!(order, SourceTable::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_stored_watermark_is_used() {
        let source = populated();
        let store = MemoryWatermarkStore::with_value(NAME, "2024-01-01 00:00:00.000000");
        let extraction = orchestrator(&source, store)
            .run_extraction(RunOverrides::default())
            .await
            .unwrap();

        assert!(extraction.snapshots().all(|s| s.num_rows() == 1));
        let expected = parse_timestamp("2024-01-01 00:00:00").unwrap();
        assert!(source.queries().iter().all(|q| q.since == Some(expected)));
    }

    #[tokio::test]
    async fn test_explicit_watermark_overrides_store() {
        let source = populated();
        let store = MemoryWatermarkStore::with_value(NAME, "2024-01-01 00:00:00.000000");
        let extraction = orchestrator(&source, store)
            .run_extraction(RunOverrides {
                watermark: Some(Watermark::Initial),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(extraction.snapshots().all(|s| s.num_rows() == 2));
    }

    #[tokio::test]
    async fn test_explicit_connection_overrides_connector() {
        let unused = MemorySource::new();
        let supplied = populated();
        let extraction = orchestrator(&unused, MemoryWatermarkStore::new())
            .run_extraction(RunOverrides {
                connection: Some(Arc::new(supplied.clone())),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(extraction.snapshots().count(), SourceTable::ALL.len());
        assert!(unused.queries().is_empty());
        assert_eq!(supplied.queries().len(), SourceTable::ALL.len());
    }

    #[tokio::test]
    async fn test_unchanged_tables_are_absent() {
        let source = populated();
        source.insert_table(
            SourceTable::Design,
            &[
                ("design_id", ColumnType::Int),
                ("last_updated", ColumnType::Timestamp),
            ],
            vec![],
        );
        let extraction = orchestrator(&source, MemoryWatermarkStore::new())
            .run_extraction(RunOverrides::default())
            .await
            .unwrap();

        let unchanged: Vec<_> = extraction.unchanged_tables().collect();
        assert_eq!(unchanged, vec![SourceTable::Design]);
    }

    #[tokio::test]
    async fn test_single_failure_aborts_run() {
        let source = populated();
        source.fail_table(
            SourceTable::Payment,
            SourceError::Infrastructure {
                message: "timeout".into(),
            },
        );
        let err = orchestrator(&source, MemoryWatermarkStore::new())
            .with_max_concurrent_captures(11)
            .run_extraction(RunOverrides::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExtractError::Capture {
                source: CaptureError::Source { ref table, .. }
            } if table == "payment"
        ));
    }
}
