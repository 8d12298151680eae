//! Delta Lake table location, schema conversion and open-or-create.

use deltalake::DeltaTable;
use deltalake::kernel::StructType;
use deltalake::operations::create::CreateBuilder;
use object_store::path::Path;
use tracing::{debug, info};
use url::Url;

use tote_core::arrow::datatypes::Schema;
use tote_core::storage::{BackendConfig, StorageProvider};
use tote_core::table::TargetTable;

use crate::error::WarehouseError;

/// Register the S3 object store handlers with deltalake. Idempotent.
pub fn ensure_handlers_registered() {
    deltalake::aws::register_handlers(None);
}

/// Convert an Arrow schema to a Delta schema.
pub fn arrow_schema_to_delta(schema: &Schema) -> Result<StructType, WarehouseError> {
    use deltalake::kernel::engine::arrow_conversion::TryIntoKernel;
    use deltalake::kernel::{DataType as DeltaType, StructField};

    let fields = schema
        .fields()
        .iter()
        .map(|field| {
            let delta_type: DeltaType = field
                .data_type()
                .try_into_kernel()
                .map_err(|source| WarehouseError::SchemaConversion { source })?;
            Ok(StructField::new(field.name(), delta_type, field.is_nullable()))
        })
        .collect::<Result<Vec<_>, WarehouseError>>()?;

    StructType::try_new(fields).map_err(|e| WarehouseError::StructType {
        message: e.to_string(),
    })
}

/// Delta table URL for the location a storage provider points at.
pub fn build_table_url(storage: &StorageProvider) -> String {
    match storage.config() {
        BackendConfig::S3(s3) => {
            format!("s3://{}/{}", s3.bucket, storage.qualify_path(&Path::default()))
        }
        BackendConfig::Local(local) => format!("file://{}", local.path),
    }
}

/// Open the table at `storage`, creating it with `schema` when absent.
pub async fn open_or_create_table(
    storage: &StorageProvider,
    schema: &Schema,
    table: TargetTable,
) -> Result<DeltaTable, WarehouseError> {
    let table_url = build_table_url(storage);
    let parsed_url = Url::parse(&table_url).map_err(|_| WarehouseError::UrlParse {
        url: table_url.clone(),
    })?;

    match deltalake::open_table_with_storage_options(parsed_url, storage.storage_options().clone())
        .await
    {
        Ok(delta) => {
            debug!(
                table = table.name(),
                version = delta.version().unwrap_or(-1),
                "Opened existing Delta table"
            );
            Ok(delta)
        }
        Err(open_error) => {
            info!(table = table.name(), url = %table_url, reason = %open_error, "Creating Delta table");
            let delta_schema = arrow_schema_to_delta(schema)?;
            CreateBuilder::new()
                .with_location(&table_url)
                .with_table_name(table.name())
                .with_columns(delta_schema.fields().cloned())
                .with_storage_options(storage.storage_options().clone())
                .await
                .map_err(|source| WarehouseError::DeltaOperation {
                    table: table.name().to_string(),
                    source,
                })
        }
    }
}

/// Check that `incoming` has the table's columns, in order, with the same types.
pub fn check_table_schema(
    delta: &DeltaTable,
    incoming: &Schema,
    table: TargetTable,
) -> Result<(), WarehouseError> {
    let snapshot = delta
        .snapshot()
        .map_err(|source| WarehouseError::DeltaOperation {
            table: table.name().to_string(),
            source,
        })?;
    let existing = snapshot.schema();
    let incoming = arrow_schema_to_delta(incoming)?;

    let existing_columns: Vec<_> = existing
        .fields()
        .map(|field| (field.name().to_string(), field.data_type().clone()))
        .collect();
    let incoming_columns: Vec<_> = incoming
        .fields()
        .map(|field| (field.name().to_string(), field.data_type().clone()))
        .collect();

    if existing_columns == incoming_columns {
        return Ok(());
    }

    let describe = |columns: &[(String, deltalake::kernel::DataType)]| {
        columns
            .iter()
            .map(|(name, data_type)| format!("{name}: {data_type:?}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(WarehouseError::SchemaMismatch {
        table: table.name().to_string(),
        message: format!(
            "table has [{}], input has [{}]",
            describe(&existing_columns),
            describe(&incoming_columns)
        ),
    })
}
