//! Source database access.
//!
//! The capture engine talks to the operational database through
//! [`SourceConnection`]; [`SourceConnector`] opens a fresh connection when a
//! run is not handed one.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemorySource;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnector, PostgresSource};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

use tote_core::table::{LAST_UPDATED, SourceTable};

use crate::error::SourceError;

/// A single cell returned by the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

impl Value {
    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
        }
    }
}

/// Precision used for a NUMERIC column declared without a type modifier.
pub const UNCONSTRAINED_PRECISION: u8 = 38;
/// Scale used for a NUMERIC column declared without a type modifier.
pub const UNCONSTRAINED_SCALE: i8 = 10;

/// Declared type of a source column.
///
/// Fixed by the table definition, so a column keeps the same staged type
/// whatever values a particular run happens to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Decimal { precision: u8, scale: i8 },
    Text,
    Timestamp,
    Date,
}

impl ColumnType {
    /// Whether `value` may be stored in a column of this type.
    pub fn admits(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Bool, Value::Bool(_))
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_))
                | (ColumnType::Decimal { .. }, Value::Decimal(_))
                | (ColumnType::Text, Value::Text(_))
                | (ColumnType::Timestamp, Value::Timestamp(_))
                | (ColumnType::Date, Value::Date(_))
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Bool => f.write_str("bool"),
            ColumnType::Int => f.write_str("int"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            ColumnType::Text => f.write_str("text"),
            ColumnType::Timestamp => f.write_str("timestamp"),
            ColumnType::Date => f.write_str("date"),
        }
    }
}

/// A result column as the source describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Incremental select against one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureQuery {
    pub table: SourceTable,
    /// Exclusive lower bound on the change-time column; `None` selects all rows.
    pub since: Option<NaiveDateTime>,
}

impl CaptureQuery {
    /// SQL text. The lower bound, when present, is bound as `$1`.
    ///
    /// The bound is a zone-less timestamp and is cast explicitly, so the
    /// change-time column may be either `timestamp` or `timestamptz`. A
    /// `timestamptz` column is compared in the session time zone.
    pub fn sql(&self) -> String {
        match self.since {
            None => format!("SELECT * FROM \"{}\"", self.table.name()),
            Some(_) => format!(
                "SELECT * FROM \"{}\" WHERE {LAST_UPDATED} > $1::timestamp",
                self.table.name()
            ),
        }
    }
}

/// Column descriptors and rows in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

/// An open connection able to run capture queries.
///
/// Implementations must allow concurrent `query` calls.
#[async_trait]
pub trait SourceConnection: Send + Sync {
    async fn query(&self, query: &CaptureQuery) -> Result<QueryResult, SourceError>;
}

/// Opens source connections.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn SourceConnection>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tote_core::timestamp::parse_timestamp;

    #[test]
    fn test_full_capture_sql() {
        let query = CaptureQuery {
            table: SourceTable::Transaction,
            since: None,
        };
        assert_eq!(query.sql(), "SELECT * FROM \"transaction\"");
    }

    #[test]
    fn test_incremental_capture_sql() {
        let query = CaptureQuery {
            table: SourceTable::SalesOrder,
            since: Some(parse_timestamp("2024-02-14 10:00:00").unwrap()),
        };
        assert_eq!(
            query.sql(),
            "SELECT * FROM \"sales_order\" WHERE last_updated > $1::timestamp"
        );
    }

    #[test]
    fn test_column_type_admits_null_and_own_kind() {
        let price = ColumnType::Decimal {
            precision: 10,
            scale: 2,
        };
        assert!(price.admits(&Value::Null));
        assert!(price.admits(&Value::Decimal(Decimal::new(325, 2))));
        assert!(!price.admits(&Value::Float(3.25)));
        assert!(ColumnType::Int.admits(&Value::Int(7)));
        assert!(!ColumnType::Int.admits(&Value::Text("7".into())));
        assert_eq!(price.to_string(), "decimal(10,2)");
    }
}
