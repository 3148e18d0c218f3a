//! Storage Engine
//!
//! Relational store the pipeline reads schema from and runs queries against.

pub mod ingest;
pub mod sqlite;

pub use ingest::ingest_csv;
pub use sqlite::SqliteStorage;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A column as reported by the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Full schema: table name -> columns in declaration order.
pub type DatabaseSchema = BTreeMap<String, Vec<ColumnInfo>>;

/// The part of a [`DatabaseSchema`] relevant to one question, in relevance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSubset {
    tables: Vec<(String, Vec<ColumnInfo>)>,
}

impl SchemaSubset {
    /// Restrict `schema` to `tables`, keeping their order. Names missing from
    /// the schema and repeated names are skipped.
    pub fn select(schema: &DatabaseSchema, tables: &[String]) -> Self {
        let mut selected: Vec<(String, Vec<ColumnInfo>)> = Vec::new();
        for name in tables {
            if selected.iter().any(|(seen, _)| seen == name) {
                continue;
            }
            if let Some(columns) = schema.get(name) {
                selected.push((name.clone(), columns.clone()));
            }
        }
        Self { tables: selected }
    }

    pub fn tables(&self) -> &[(String, Vec<ColumnInfo>)] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// One result row, keyed by column name in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// What running a statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Statement returned a result set (possibly empty).
    Rows { columns: Vec<String>, rows: Vec<Row> },
    /// Statement returned no columns; carries the number of changed rows.
    Affected(usize),
}

impl QueryOutcome {
    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Rows { rows, .. } => rows.len(),
            QueryOutcome::Affected(_) => 0,
        }
    }
}

#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn get_schema(&self) -> Result<DatabaseSchema>;

    async fn execute_query(&self, sql: &str) -> Result<QueryOutcome>;
}
