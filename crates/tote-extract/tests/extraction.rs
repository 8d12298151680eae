use std::sync::Arc;

use tempfile::TempDir;

use tote_core::arrow::datatypes::DataType;
use tote_core::codec::decode_batch;
use tote_core::staging::StagingKey;
use tote_core::storage::{StorageProvider, StorageProviderRef};
use tote_core::table::SourceTable;
use tote_core::timestamp::{RunTimestamp, parse_timestamp};
use tote_core::watermark::{StorageWatermarkStore, WatermarkStore};
use tote_extract::{
    ColumnType, ExtractError, ExtractionJob, ExtractionReport, MemorySource, Orchestrator,
    RunOverrides, SnapshotWriter, SourceError, Value,
};

const WATERMARK: &str = "last_ingested_timestamp";

fn changed_at(ts: &str) -> Value {
    Value::Timestamp(parse_timestamp(ts).unwrap())
}

fn seed(source: &MemorySource) {
    for table in SourceTable::ALL {
        source.insert_table(
            table,
            &[
                (table.primary_key(), ColumnType::Int),
                ("created_at", ColumnType::Timestamp),
                ("last_updated", ColumnType::Timestamp),
            ],
            vec![vec![
                Value::Int(1),
                changed_at("2022-11-03 14:20:49.962"),
                changed_at("2022-11-03 14:20:49.962"),
            ]],
        );
    }
}

async fn storage(dir: &TempDir) -> StorageProviderRef {
    StorageProvider::shared(dir.path().to_str().unwrap(), Default::default())
        .await
        .unwrap()
}

fn job(source: &MemorySource, storage: &StorageProviderRef) -> ExtractionJob {
    let store = Arc::new(StorageWatermarkStore::new(Arc::clone(storage)));
    let orchestrator = Orchestrator::new(store, WATERMARK, Arc::new(source.clone()))
        .with_max_concurrent_captures(3);
    ExtractionJob::new(orchestrator, SnapshotWriter::new(Arc::clone(storage)))
}

async fn stored_watermark(storage: &StorageProviderRef) -> String {
    StorageWatermarkStore::new(Arc::clone(storage))
        .get(WATERMARK)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_first_run_stages_every_table_and_advances_watermark() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;
    let source = MemorySource::new();
    seed(&source);

    let run = RunTimestamp::parse("2024-02-14 10:00:00.000000").unwrap();
    let report = job(&source, &storage)
        .run(RunOverrides {
            run_timestamp: Some(run),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.staged.len(), SourceTable::ALL.len());
    assert!(report.unchanged.is_empty());

    let staff = StagingKey::new("staff", &run);
    assert_eq!(staff.to_string(), "staff/2024-02-14/10:00:00.000000.parquet");
    let batch = decode_batch(storage.get(&staff.to_path()).await.unwrap()).unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(batch.schema().field(0).name(), "staff_id");

    assert_eq!(stored_watermark(&storage).await, "2024-02-14 10:00:00.000000");
}

#[tokio::test]
async fn test_second_run_only_captures_new_changes() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;
    let source = MemorySource::new();
    seed(&source);
    let job = job(&source, &storage);

    job.run(RunOverrides {
        run_timestamp: Some(RunTimestamp::parse("2024-02-14 10:00:00.000000").unwrap()),
        ..Default::default()
    })
    .await
    .unwrap();

    source.insert_table(
        SourceTable::Currency,
        &[
            ("currency_id", ColumnType::Int),
            ("created_at", ColumnType::Timestamp),
            ("last_updated", ColumnType::Timestamp),
        ],
        vec![
            vec![
                Value::Int(1),
                changed_at("2022-11-03 14:20:49.962"),
                changed_at("2022-11-03 14:20:49.962"),
            ],
            vec![
                Value::Int(2),
                changed_at("2024-02-14 11:00:00"),
                changed_at("2024-02-14 11:00:00"),
            ],
        ],
    );

    let report = job
        .run(RunOverrides {
            run_timestamp: Some(RunTimestamp::parse("2024-02-14 12:00:00.000000").unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.staged.len(), 1);
    assert_eq!(report.staged[0].table(), "currency");
    assert_eq!(report.unchanged.len(), SourceTable::ALL.len() - 1);

    let batch = decode_batch(storage.get(&report.staged[0].to_path()).await.unwrap()).unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(stored_watermark(&storage).await, "2024-02-14 12:00:00.000000");
}

#[tokio::test]
async fn test_failed_run_leaves_watermark_unchanged() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;
    let source = MemorySource::new();
    seed(&source);
    source.fail_table(
        SourceTable::Transaction,
        SourceError::Infrastructure {
            message: "server closed the connection unexpectedly".into(),
        },
    );

    let err = job(&source, &storage)
        .run(RunOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Capture { .. }));
    assert_eq!(stored_watermark(&storage).await, "None");
    assert!(storage.list_keys("staff/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_explicit_run_older_than_watermark_is_rejected() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;
    let source = MemorySource::new();
    seed(&source);
    let job = job(&source, &storage);

    job.run(RunOverrides {
        run_timestamp: Some(RunTimestamp::parse("2024-02-14 10:00:00.000000").unwrap()),
        ..Default::default()
    })
    .await
    .unwrap();

    let err = job
        .run(RunOverrides {
            watermark: Some(tote_core::Watermark::Initial),
            run_timestamp: Some(RunTimestamp::parse("2023-01-01 00:00:00.000000").unwrap()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Watermark { .. }));
    assert_eq!(stored_watermark(&storage).await, "2024-02-14 10:00:00.000000");
}

const TRANSACTION_COLUMNS: &[(&str, ColumnType)] = &[
    ("transaction_id", ColumnType::Int),
    ("transaction_type", ColumnType::Text),
    ("sales_order_id", ColumnType::Int),
    ("purchase_order_id", ColumnType::Int),
    ("created_at", ColumnType::Timestamp),
    ("last_updated", ColumnType::Timestamp),
];

fn transaction(
    id: i64,
    sales_order: Option<i64>,
    purchase_order: Option<i64>,
    at: &str,
) -> Vec<Value> {
    let order = |id: Option<i64>| id.map(Value::Int).unwrap_or(Value::Null);
    let kind = if sales_order.is_some() { "SALE" } else { "PURCHASE" };
    vec![
        Value::Int(id),
        Value::Text(kind.into()),
        order(sales_order),
        order(purchase_order),
        changed_at(at),
        changed_at(at),
    ]
}

#[tokio::test]
async fn test_all_null_foreign_key_keeps_staged_type_across_runs() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir).await;
    let source = MemorySource::new();
    seed(&source);
    source.insert_table(
        SourceTable::Transaction,
        TRANSACTION_COLUMNS,
        vec![transaction(1, Some(7), None, "2024-02-14 09:00:00")],
    );
    let job = job(&source, &storage);

    let first = job
        .run(RunOverrides {
            run_timestamp: Some(RunTimestamp::parse("2024-02-14 10:00:00.000000").unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();

    // Only purchases change before the next run, so sales_order_id is null
    // in every captured row.
    source.insert_table(
        SourceTable::Transaction,
        TRANSACTION_COLUMNS,
        vec![
            transaction(1, Some(7), None, "2024-02-14 09:00:00"),
            transaction(2, None, Some(5), "2024-02-14 11:00:00"),
            transaction(3, None, Some(6), "2024-02-14 11:30:00"),
        ],
    );
    let second = job
        .run(RunOverrides {
            run_timestamp: Some(RunTimestamp::parse("2024-02-14 12:00:00.000000").unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();

    let staged = |report: &ExtractionReport| {
        report
            .staged
            .iter()
            .find(|key| key.table() == "transaction")
            .unwrap()
            .to_path()
    };
    let sales = decode_batch(storage.get(&staged(&first)).await.unwrap()).unwrap();
    let purchases = decode_batch(storage.get(&staged(&second)).await.unwrap()).unwrap();

    assert_eq!(purchases.num_rows(), 2);
    assert_eq!(sales.schema(), purchases.schema());
    let sales_order_id = purchases.column_by_name("sales_order_id").unwrap();
    assert_eq!(sales_order_id.data_type(), &DataType::Int64);
    assert_eq!(sales_order_id.null_count(), 2);
}
