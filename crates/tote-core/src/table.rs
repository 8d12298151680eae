//! Source tables and their warehouse routing.
//!
//! The pipeline knows exactly eleven operational tables. Every name that
//! reaches a stage is parsed into [`SourceTable`] first, so an unknown name is
//! rejected before anything is read or written. Routing to a warehouse table
//! is an exhaustive match: adding a table without a target does not compile.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RoutingError;

/// Column holding a row's creation time.
pub const CREATED_AT: &str = "created_at";
/// Column holding a row's last-modification time; drives change capture.
pub const LAST_UPDATED: &str = "last_updated";

/// One of the operational tables captured from the source database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    Counterparty,
    Currency,
    Address,
    Department,
    Design,
    Staff,
    SalesOrder,
    Payment,
    PaymentType,
    PurchaseOrder,
    Transaction,
}

impl SourceTable {
    /// Capture order used by every extraction run.
    pub const ALL: [SourceTable; 11] = [
        SourceTable::Counterparty,
        SourceTable::Currency,
        SourceTable::Address,
        SourceTable::Department,
        SourceTable::Design,
        SourceTable::Staff,
        SourceTable::SalesOrder,
        SourceTable::Payment,
        SourceTable::PaymentType,
        SourceTable::PurchaseOrder,
        SourceTable::Transaction,
    ];

    /// Table name as it appears in the source database and staging keys.
    pub fn name(&self) -> &'static str {
        match self {
            SourceTable::Counterparty => "counterparty",
            SourceTable::Currency => "currency",
            SourceTable::Address => "address",
            SourceTable::Department => "department",
            SourceTable::Design => "design",
            SourceTable::Staff => "staff",
            SourceTable::SalesOrder => "sales_order",
            SourceTable::Payment => "payment",
            SourceTable::PaymentType => "payment_type",
            SourceTable::PurchaseOrder => "purchase_order",
            SourceTable::Transaction => "transaction",
        }
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &'static str {
        match self {
            SourceTable::Counterparty => "counterparty_id",
            SourceTable::Currency => "currency_id",
            SourceTable::Address => "address_id",
            SourceTable::Department => "department_id",
            SourceTable::Design => "design_id",
            SourceTable::Staff => "staff_id",
            SourceTable::SalesOrder => "sales_order_id",
            SourceTable::Payment => "payment_id",
            SourceTable::PaymentType => "payment_type_id",
            SourceTable::PurchaseOrder => "purchase_order_id",
            SourceTable::Transaction => "transaction_id",
        }
    }

    /// Warehouse table this source table is loaded into.
    ///
    /// `department` only feeds the staff dimension as a reference and has no
    /// target of its own.
    pub fn target(&self) -> Result<TargetTable, RoutingError> {
        let target = match self {
            SourceTable::Address => TargetTable::DimLocation,
            SourceTable::Counterparty => TargetTable::DimCounterparty,
            SourceTable::Currency => TargetTable::DimCurrency,
            SourceTable::Design => TargetTable::DimDesign,
            SourceTable::PaymentType => TargetTable::DimPaymentType,
            SourceTable::Staff => TargetTable::DimStaff,
            SourceTable::Transaction => TargetTable::DimTransaction,
            SourceTable::Payment => TargetTable::FactPayment,
            SourceTable::PurchaseOrder => TargetTable::FactPurchaseOrder,
            SourceTable::SalesOrder => TargetTable::FactSalesOrder,
            SourceTable::Department => {
                return Err(RoutingError::ReferenceOnly {
                    table: self.name().to_string(),
                });
            }
        };
        Ok(target)
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceTable {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceTable::ALL
            .into_iter()
            .find(|table| table.name() == s)
            .ok_or_else(|| RoutingError::UnknownTable {
                name: s.to_string(),
            })
    }
}

/// Table in the dimensional warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetTable {
    DimLocation,
    DimCounterparty,
    DimCurrency,
    DimDesign,
    DimPaymentType,
    DimStaff,
    DimTransaction,
    /// Calendar dimension; generated, never routed from a source table.
    DimDate,
    FactPayment,
    FactPurchaseOrder,
    FactSalesOrder,
}

impl TargetTable {
    pub const ALL: [TargetTable; 11] = [
        TargetTable::DimLocation,
        TargetTable::DimCounterparty,
        TargetTable::DimCurrency,
        TargetTable::DimDesign,
        TargetTable::DimPaymentType,
        TargetTable::DimStaff,
        TargetTable::DimTransaction,
        TargetTable::DimDate,
        TargetTable::FactPayment,
        TargetTable::FactPurchaseOrder,
        TargetTable::FactSalesOrder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TargetTable::DimLocation => "dim_location",
            TargetTable::DimCounterparty => "dim_counterparty",
            TargetTable::DimCurrency => "dim_currency",
            TargetTable::DimDesign => "dim_design",
            TargetTable::DimPaymentType => "dim_payment_type",
            TargetTable::DimStaff => "dim_staff",
            TargetTable::DimTransaction => "dim_transaction",
            TargetTable::DimDate => "dim_date",
            TargetTable::FactPayment => "fact_payment",
            TargetTable::FactPurchaseOrder => "fact_purchase_order",
            TargetTable::FactSalesOrder => "fact_sales_order",
        }
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetTable {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetTable::ALL
            .into_iter()
            .find(|table| table.name() == s)
            .ok_or_else(|| RoutingError::UnknownTable {
                name: s.to_string(),
            })
    }
}

/// Resolve a raw source table name to its warehouse table.
pub fn resolve_target(raw_table_name: &str) -> Result<TargetTable, RoutingError> {
    raw_table_name.parse::<SourceTable>()?.target()
}
