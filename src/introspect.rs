//! Schema introspection
//!
//! The store's table set varies by deployment and by which automations have
//! run, and other processes may alter it between calls. Descriptors are
//! therefore produced fresh on every call and never cached.

use rusqlite::types::Value as SqlValue;
use serde::Serialize;

use crate::store::{Row, SqliteStore, quote_identifier};
use crate::{Error, Result};

/// Upper bound on rows returned by `sample_rows`, regardless of caller input.
const SAMPLE_LIMIT_MAX: usize = 20;

/// One column of a live table.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: Option<String>,
    pub nullable: bool,
    pub is_primary_key: bool,
}

/// A live table: ordered columns plus a lazily computed row count.
///
/// `row_count` is `None` when the count query failed (e.g. the table
/// disappeared mid-call); that is captured per table, not propagated.
#[derive(Debug, Clone, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub row_count: Option<i64>,
}

impl TableDescriptor {
    /// First column whose name appears in `candidates`, in candidate order.
    pub fn find_column(&self, candidates: &[String]) -> Option<&ColumnDescriptor> {
        candidates
            .iter()
            .find_map(|c| self.columns.iter().find(|col| col.name == *c))
    }
}

/// Discovers tables and columns without prior schema knowledge.
pub struct Introspector<'a> {
    store: &'a SqliteStore,
}

impl<'a> Introspector<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// List user tables and views with their current row counts.
    pub fn list_tables(&self) -> Result<Vec<(String, Option<i64>)>> {
        let rows = self.store.execute_read(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(name) = row.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            tables.push((name.to_string(), self.count_rows(name)));
        }
        Ok(tables)
    }

    /// Columns of a table, in declaration order. Empty when the table does
    /// not exist; callers that need to distinguish use `table_exists`.
    pub fn describe_table(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows = self.store.execute_read(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)",
            &[SqlValue::Text(table.to_string())],
        )?;

        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor {
                name: row
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                declared_type: row
                    .get("type")
                    .and_then(|v| v.as_str())
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
                nullable: row.get("notnull").and_then(|v| v.as_i64()) == Some(0),
                is_primary_key: row.get("pk").and_then(|v| v.as_i64()).unwrap_or(0) > 0,
            })
            .collect())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self.store.execute_read(
            "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            &[SqlValue::Text(table.to_string())],
        )?;
        Ok(!rows.is_empty())
    }

    /// Full descriptor for a table, or `None` if it does not exist.
    pub fn descriptor(&self, table: &str) -> Result<Option<TableDescriptor>> {
        if !self.table_exists(table)? {
            return Ok(None);
        }
        Ok(Some(TableDescriptor {
            name: table.to_string(),
            columns: self.describe_table(table)?,
            row_count: self.count_rows(table),
        }))
    }

    /// A handful of rows from a table, for eyeballing its shape.
    /// Limit is clamped into [1, 20] as a payload safety bound.
    pub fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        if !self.table_exists(table)? {
            return Err(Error::UnknownTable(table.to_string()));
        }
        let limit = limit.clamp(1, SAMPLE_LIMIT_MAX);
        let sql = format!("SELECT * FROM {} LIMIT ?1", quote_identifier(table));
        self.store.execute_read(&sql, &[SqlValue::Integer(limit as i64)])
    }

    /// Count failures are a normal outcome here: the table may have been
    /// dropped between listing and counting.
    fn count_rows(&self, table: &str) -> Option<i64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", quote_identifier(table));
        match self.store.execute_read(&sql, &[]) {
            Ok(rows) => rows.first().and_then(|r| r.get("n")).and_then(|v| v.as_i64()),
            Err(e) => {
                tracing::debug!("row count failed for {}: {}", table, e);
                None
            }
        }
    }
}
