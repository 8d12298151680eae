//! PostgreSQL source adapter.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error};

use tote_core::secrets::DbCredentials;

use super::{
    CaptureQuery, Column, ColumnType, QueryResult, SourceConnection, SourceConnector,
    UNCONSTRAINED_PRECISION, UNCONSTRAINED_SCALE, Value,
};
use crate::error::SourceError;

/// Connects to PostgreSQL with the configured credentials.
pub struct PostgresConnector {
    credentials: DbCredentials,
}

impl PostgresConnector {
    pub fn new(credentials: DbCredentials) -> Self {
        Self { credentials }
    }
}

/// SQLSTATE class 42 covers syntax errors and access rule violations.
fn classify(err: tokio_postgres::Error) -> SourceError {
    let message = err.to_string();
    match err.code() {
        Some(state) if state.code().starts_with("42") => SourceError::Programming { message },
        _ => SourceError::Infrastructure { message },
    }
}

#[async_trait]
impl SourceConnector for PostgresConnector {
    async fn connect(&self) -> Result<Arc<dyn SourceConnection>, SourceError> {
        let (client, connection) =
            tokio_postgres::connect(&self.credentials.connection_string("postgresql"), NoTls)
                .await
                .map_err(classify)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Source connection closed with error");
            }
        });

        debug!(
            host = %self.credentials.host,
            database = %self.credentials.database,
            "Connected to source"
        );
        Ok(Arc::new(PostgresSource { client }))
    }
}

/// A PostgreSQL client. Queries are pipelined over the one connection, so
/// concurrent captures are safe.
pub struct PostgresSource {
    client: Client,
}

fn unsupported(column: &tokio_postgres::Column, type_name: impl Into<String>) -> SourceError {
    SourceError::UnsupportedType {
        column: column.name().to_string(),
        type_name: type_name.into(),
    }
}

/// Precision and scale packed into a NUMERIC type modifier, or `None` when
/// the column was declared without one.
fn numeric_modifier(type_modifier: i32) -> Option<(i32, i32)> {
    let packed = type_modifier.checked_sub(4).filter(|packed| *packed >= 0)?;
    Some(((packed >> 16) & 0xffff, packed & 0xffff))
}

/// The declared type of a result column.
fn column_type(column: &tokio_postgres::Column) -> Result<ColumnType, SourceError> {
    let column_type = match *column.type_() {
        Type::BOOL => ColumnType::Bool,
        Type::INT2 | Type::INT4 | Type::INT8 => ColumnType::Int,
        Type::FLOAT4 | Type::FLOAT8 => ColumnType::Float,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => ColumnType::Text,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => ColumnType::Timestamp,
        Type::DATE => ColumnType::Date,
        Type::NUMERIC => match numeric_modifier(column.type_modifier()) {
            None => ColumnType::Decimal {
                precision: UNCONSTRAINED_PRECISION,
                scale: UNCONSTRAINED_SCALE,
            },
            Some((declared_precision, declared_scale)) => {
                let precision = u8::try_from(declared_precision)
                    .ok()
                    .filter(|p| (1..=UNCONSTRAINED_PRECISION).contains(p));
                let scale = i8::try_from(declared_scale).ok().filter(|s| *s >= 0);
                let (Some(precision), Some(scale)) = (precision, scale) else {
                    return Err(unsupported(
                        column,
                        format!("numeric({declared_precision},{declared_scale})"),
                    ));
                };
                ColumnType::Decimal { precision, scale }
            }
        },
        ref other => return Err(unsupported(column, other.name())),
    };
    Ok(column_type)
}

fn cell(row: &Row, idx: usize) -> Result<Value, SourceError> {
    let column = &row.columns()[idx];
    let decode_err = |e: tokio_postgres::Error| SourceError::Infrastructure {
        message: format!("failed to decode column '{}': {e}", column.name()),
    };

    let value = match *column.type_() {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map_err(decode_err)?
            .map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map_err(decode_err)?
            .map(|v| Value::Int(v.into())),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map_err(decode_err)?
            .map(|v| Value::Int(v.into())),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map_err(decode_err)?
            .map(Value::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(decode_err)?
            .map(|v| Value::Float(v.into())),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map_err(decode_err)?
            .map(Value::Float),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)
            .map_err(decode_err)?
            .map(Value::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
            .try_get::<_, Option<String>>(idx)
            .map_err(decode_err)?
            .map(Value::Text),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map_err(decode_err)?
            .map(Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map_err(decode_err)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map_err(decode_err)?
            .map(Value::Date),
        ref other => return Err(unsupported(column, other.name())),
    };

    Ok(value.unwrap_or(Value::Null))
}

#[async_trait]
impl SourceConnection for PostgresSource {
    async fn query(&self, query: &CaptureQuery) -> Result<QueryResult, SourceError> {
        let sql = query.sql();
        let statement = self.client.prepare(&sql).await.map_err(classify)?;

        let params: Vec<&(dyn ToSql + Sync)> = match &query.since {
            Some(since) => vec![since],
            None => Vec::new(),
        };
        let rows = self
            .client
            .query(&statement, &params)
            .await
            .map_err(classify)?;

        let columns = statement
            .columns()
            .iter()
            .map(|c| Ok(Column::new(c.name(), column_type(c)?)))
            .collect::<Result<Vec<_>, SourceError>>()?;

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| cell(row, idx)).collect())
            .collect::<Result<Vec<Vec<Value>>, _>>()?;

        debug!(table = %query.table, rows = rows.len(), "Source query completed");
        Ok(QueryResult { columns, rows })
    }
}
