//! tote-load: append processed files to the warehouse.
//!
//! Every processed file is loaded into the table named by its key in one
//! all-or-nothing transaction. The calendar dimension is generated here
//! rather than captured.

pub mod calendar;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod warehouse;

pub use calendar::dim_date;
pub use error::{LoadError, WarehouseError};
pub use handler::LoadHandler;
pub use warehouse::{
    DeltaWarehouse, FailurePoint, LoadReceipt, MemoryWarehouse, Warehouse, WarehouseTransaction,
    append_in_transaction,
};
