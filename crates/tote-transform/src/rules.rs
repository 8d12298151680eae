//! Per-table transform rules.
//!
//! [`transform`] dispatches on the closed [`SourceTable`] set. Each rule is a
//! pure function of the raw batch and, for counterparty and staff, a
//! reference aggregate.

use tracing::warn;

use tote_core::emit;
use tote_core::error::RoutingError;
use tote_core::arrow::record_batch::RecordBatch;
use tote_core::table::{CREATED_AT, LAST_UPDATED, SourceTable};

use crate::error::TransformError;
use crate::metrics::JoinRowsDropped;
use crate::primitives::{
    JoinOn, add_currency_names, drop_change_times, drop_columns, inner_join, project_columns,
    rename_columns, split_change_times,
};
use crate::reference::ReferenceFetcher;

const COUNTERPARTY_ADDRESS_RENAMES: [(&str, &str); 7] = [
    ("address_line_1", "counterparty_legal_address_line_1"),
    ("address_line_2", "counterparty_legal_address_line_2"),
    ("district", "counterparty_legal_district"),
    ("city", "counterparty_legal_city"),
    ("postal_code", "counterparty_legal_postal_code"),
    ("country", "counterparty_legal_country"),
    ("phone", "counterparty_legal_phone_number"),
];

const DIM_STAFF_COLUMNS: [&str; 6] = [
    "staff_id",
    "first_name",
    "last_name",
    "department_name",
    "location",
    "email_address",
];

/// Reshape a raw snapshot of `table` into its warehouse target.
pub async fn transform(
    table: SourceTable,
    raw: &RecordBatch,
    references: &dyn ReferenceFetcher,
) -> Result<RecordBatch, TransformError> {
    match table {
        SourceTable::Address => dim_location(raw),
        SourceTable::Counterparty => {
            let address = references.fetch(SourceTable::Address).await?;
            dim_counterparty(raw, &address)
        }
        SourceTable::Currency => dim_currency(raw),
        SourceTable::Design | SourceTable::PaymentType | SourceTable::Transaction => {
            drop_change_times(raw)
        }
        SourceTable::Staff => {
            let department = references.fetch(SourceTable::Department).await?;
            dim_staff(raw, &department)
        }
        SourceTable::Payment => fact_payment(raw),
        SourceTable::PurchaseOrder => split_change_times(raw),
        SourceTable::SalesOrder => fact_sales_order(raw),
        SourceTable::Department => Err(RoutingError::ReferenceOnly {
            table: table.name().to_string(),
        }
        .into()),
    }
}

/// `address` → `dim_location`.
pub fn dim_location(raw: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let out = drop_change_times(raw)?;
    rename_columns(&out, &[(SourceTable::Address.primary_key(), "location_id")])
}

/// `counterparty` → `dim_counterparty`, enriched with its legal address.
pub fn dim_counterparty(
    raw: &RecordBatch,
    address: &RecordBatch,
) -> Result<RecordBatch, TransformError> {
    let counterparty = project_columns(
        raw,
        &["counterparty_id", "counterparty_legal_name", "legal_address_id"],
    )?;
    let address = drop_columns(address, &[CREATED_AT, LAST_UPDATED])?;

    let joined = inner_join(
        &counterparty,
        &address,
        JoinOn {
            left: "legal_address_id",
            right: "address_id",
        },
    )?;
    report_dropped(SourceTable::Counterparty, SourceTable::Address, joined.unmatched_left);

    let out = drop_columns(&joined.batch, &["legal_address_id", "address_id"])?;
    rename_columns(&out, &COUNTERPARTY_ADDRESS_RENAMES)
}

/// `currency` → `dim_currency` with a `currency_name` column.
pub fn dim_currency(raw: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let out = drop_change_times(raw)?;
    add_currency_names(&out, "currency_code")
}

/// `staff` → `dim_staff`, enriched with department name and location.
pub fn dim_staff(raw: &RecordBatch, department: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let joined = inner_join(raw, department, JoinOn::column("department_id"))?;
    report_dropped(SourceTable::Staff, SourceTable::Department, joined.unmatched_left);
    project_columns(&joined.batch, &DIM_STAFF_COLUMNS)
}

/// `payment` → `fact_payment`, without the account numbers.
pub fn fact_payment(raw: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let out = split_change_times(raw)?;
    drop_columns(&out, &["company_ac_number", "counterparty_ac_number"])
}

/// `sales_order` → `fact_sales_order`.
pub fn fact_sales_order(raw: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let out = split_change_times(raw)?;
    rename_columns(&out, &[("staff_id", "sales_staff_id")])
}

fn report_dropped(table: SourceTable, reference: SourceTable, dropped: usize) {
    if dropped == 0 {
        return;
    }
    warn!(
        %table,
        %reference,
        dropped,
        "Inner join dropped rows without a matching reference"
    );
    emit!(JoinRowsDropped {
        table,
        reference,
        count: dropped as u64,
    });
}
