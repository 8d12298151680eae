//! In-memory source for tests and local dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tote_core::table::{LAST_UPDATED, SourceTable};
use tote_core::timestamp::parse_timestamp;

use super::{
    CaptureQuery, Column, ColumnType, QueryResult, SourceConnection, SourceConnector, Value,
};
use crate::error::SourceError;

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<SourceTable, QueryResult>,
    failures: HashMap<SourceTable, SourceError>,
    queries: Vec<CaptureQuery>,
}

/// Tables held in memory, filtered on `last_updated` like the real source.
///
/// Clones share state, so a test can keep a handle and inspect the queries
/// issued through the connection handed to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents and declared columns of `table`.
    pub fn insert_table(
        &self,
        table: SourceTable,
        columns: &[(&str, ColumnType)],
        rows: Vec<Vec<Value>>,
    ) {
        let result = QueryResult {
            columns: columns
                .iter()
                .map(|(name, column_type)| Column::new(*name, *column_type))
                .collect(),
            rows,
        };
        self.lock().tables.insert(table, result);
    }

    /// Make every query against `table` fail with `error`.
    pub fn fail_table(&self, table: SourceTable, error: SourceError) {
        self.lock().failures.insert(table, error);
    }

    /// Queries issued so far, in call order.
    pub fn queries(&self) -> Vec<CaptureQuery> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn change_time(value: &Value) -> Option<chrono::NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Text(text) => parse_timestamp(text).ok(),
        _ => None,
    }
}

#[async_trait]
impl SourceConnection for MemorySource {
    async fn query(&self, query: &CaptureQuery) -> Result<QueryResult, SourceError> {
        let mut inner = self.lock();
        inner.queries.push(*query);

        if let Some(error) = inner.failures.get(&query.table) {
            return Err(error.clone());
        }

        let Some(table) = inner.tables.get(&query.table) else {
            return Err(SourceError::Programming {
                message: format!("relation \"{}\" does not exist", query.table),
            });
        };

        let Some(since) = query.since else {
            return Ok(table.clone());
        };

        let Some(position) = table.columns.iter().position(|c| c.name == LAST_UPDATED) else {
            return Err(SourceError::Programming {
                message: format!("column \"{LAST_UPDATED}\" does not exist"),
            });
        };

        let rows = table
            .rows
            .iter()
            .filter(|row| {
                row.get(position)
                    .and_then(change_time)
                    .is_some_and(|ts| ts > since)
            })
            .cloned()
            .collect();

        Ok(QueryResult {
            columns: table.columns.clone(),
            rows,
        })
    }
}

#[async_trait]
impl SourceConnector for MemorySource {
    async fn connect(&self) -> Result<Arc<dyn SourceConnection>, SourceError> {
        Ok(Arc::new(self.clone()))
    }
}
