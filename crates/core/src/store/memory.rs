//! In-memory storage backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::Storage;
use crate::Error;
use crate::value::{Filter, Row, Value};

#[derive(Debug, Default)]
struct MemoryTable {
    fields: BTreeSet<String>,
    primary_key: String,
    rows: Vec<Row>,
}

/// Tables of rows held in process memory.
///
/// Structured filters are evaluated directly; raw SQL conditions are
/// rejected. Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<BTreeMap<String, MemoryTable>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table with the given columns.
    pub fn create_table<I, S>(&self, table: &str, primary_key: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        fields.insert(primary_key.to_string());
        self.tables.write().insert(
            table.to_string(),
            MemoryTable { fields, primary_key: primary_key.to_string(), rows: Vec::new() },
        );
    }

    /// Append a row. Columns the table does not define are dropped.
    pub fn insert(&self, table: &str, row: Row) -> Result<(), Error> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;
        let row = row.into_iter().filter(|(k, _)| table.fields.contains(k)).collect();
        table.rows.push(row);
        Ok(())
    }

    /// Replace the row with the same primary key, or append it.
    pub fn upsert(&self, table: &str, row: Row) -> Result<(), Error> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;
        let row: Row = row.into_iter().filter(|(k, _)| table.fields.contains(k)).collect();
        let key = row.get(&table.primary_key).cloned().unwrap_or_default();
        let filter = Filter::Eq(table.primary_key.clone(), key);
        match table.rows.iter_mut().find(|r| filter.matches(r) == Some(true)) {
            Some(existing) => *existing = row,
            None => table.rows.push(row),
        }
        Ok(())
    }

    /// The row with the given primary key.
    pub fn find(&self, table: &str, key: &Value) -> Option<Row> {
        let tables = self.tables.read();
        let table = tables.get(table)?;
        let filter = Filter::Eq(table.primary_key.clone(), key.clone());
        table.rows.iter().find(|r| filter.matches(r) == Some(true)).cloned()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }
}

fn unsupported(filter: &Filter) -> Error {
    Error::UnsupportedFilter(format!("memory store cannot evaluate {filter:?}"))
}

#[async_trait::async_trait]
impl Storage for MemoryStore {
    async fn update_matching(&self, table: &str, values: &Row, filter: &Filter) -> Result<u64, Error> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;

        let mut updated = 0u64;
        for row in &mut table.rows {
            if !filter.matches(row).ok_or_else(|| unsupported(filter))? {
                continue;
            }
            for (field, value) in values {
                row.insert(field.clone(), value.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }

    async fn select_matching(&self, table: &str, filter: &Filter, limit: Option<usize>) -> Result<Vec<Row>, Error> {
        let tables = self.tables.read();
        let table = tables
            .get(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;

        let mut selected = Vec::new();
        for row in &table.rows {
            if limit.is_some_and(|limit| selected.len() >= limit) {
                break;
            }
            if filter.matches(row).ok_or_else(|| unsupported(filter))? {
                selected.push(row.clone());
            }
        }
        Ok(selected)
    }

    async fn field_names(&self, table: &str) -> Result<BTreeSet<String>, Error> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.fields.clone())
            .ok_or_else(|| Error::UnknownTable(table.to_string()))
    }
}
