//! Engine facade
//!
//! The four public operations an agent or operator can invoke: `inspect`,
//! `query`, `raw_query`, and `summarize`. Everything is request-scoped and
//! synchronous: each call opens its own store connection, runs to
//! completion, and returns a JSON-representable result or a tagged error.

use std::str::FromStr;

use serde::Serialize;
use serde_json::{Value as Json, json};

use crate::config::Catalog;
use crate::introspect::Introspector;
use crate::query::builder::{self, AppliedFilterReport, QueryFilter};
use crate::query::guard;
use crate::query::summary::{Summarizer, SummaryReport};
use crate::store::{Row, SqliteStore};
use crate::{Error, Result};

/// What `inspect` should look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectMode {
    /// All tables with row counts.
    Tables,
    /// All tables with their full column descriptors.
    Schema,
    /// Column descriptors for one table.
    Columns,
    /// A few example rows from one table.
    Sample,
}

impl FromStr for InspectMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tables" => Ok(InspectMode::Tables),
            "schema" => Ok(InspectMode::Schema),
            "columns" => Ok(InspectMode::Columns),
            "sample" => Ok(InspectMode::Sample),
            other => Err(Error::Config(format!(
                "unknown inspect mode `{}` (expected tables|schema|columns|sample)",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryOutput {
    pub experiment: String,
    pub table: String,
    pub returned_rows: usize,
    pub applied_filters: AppliedFilterReport,
    pub rows: Vec<Row>,
}

#[derive(Debug, Serialize)]
pub struct RawQueryOutput {
    pub executed_sql: String,
    /// True when the guard appended the row ceiling itself.
    pub limit_appended: bool,
    pub returned_rows: usize,
    pub rows: Vec<Row>,
}

/// The schema-aware query engine over one experiment store.
pub struct DataEngine {
    store: SqliteStore,
    catalog: Catalog,
}

impl DataEngine {
    pub fn new(store: SqliteStore, catalog: Catalog) -> Self {
        Self { store, catalog }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Explore the live schema. `table` is required for `columns`/`sample`.
    pub fn inspect(
        &self,
        mode: InspectMode,
        table: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Json> {
        let introspector = Introspector::new(&self.store);
        match mode {
            InspectMode::Tables => {
                let tables: Vec<Json> = introspector
                    .list_tables()?
                    .into_iter()
                    .map(|(name, row_count)| json!({ "name": name, "row_count": row_count }))
                    .collect();
                Ok(json!({ "table_count": tables.len(), "tables": tables }))
            }
            InspectMode::Schema => {
                let mut tables = Vec::new();
                for (name, _) in introspector.list_tables()? {
                    // One broken table (e.g. a view over a dropped table)
                    // degrades its own entry, not the whole listing.
                    match introspector.descriptor(&name) {
                        Ok(Some(descriptor)) => {
                            tables.push(serde_json::to_value(descriptor).unwrap_or(Json::Null));
                        }
                        Ok(None) => {}
                        Err(e @ Error::StoreUnavailable(_)) => return Err(e),
                        Err(e) => tables.push(json!({ "name": name, "error": e.to_string() })),
                    }
                }
                Ok(json!({ "tables": tables }))
            }
            InspectMode::Columns => {
                let table = require_table(table, "columns")?;
                // A missing table is an explicit error here, never an
                // empty-success result.
                match introspector.descriptor(table)? {
                    Some(descriptor) => Ok(serde_json::to_value(descriptor)
                        .map_err(|e| Error::Config(e.to_string()))?),
                    None => Err(Error::UnknownTable(table.to_string())),
                }
            }
            InspectMode::Sample => {
                let table = require_table(table, "sample")?;
                let rows = introspector.sample_rows(table, limit.unwrap_or(5))?;
                Ok(json!({ "table": table, "returned_rows": rows.len(), "rows": rows }))
            }
        }
    }

    /// Recent rows from one table for one experiment, filters adapted to the
    /// table's live columns.
    pub fn query(
        &self,
        experiment: &str,
        table: &str,
        limit: usize,
        window_hours: u32,
    ) -> Result<QueryOutput> {
        let introspector = Introspector::new(&self.store);
        let descriptor = introspector
            .descriptor(table)?
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;

        let filter = QueryFilter::last_hours(experiment, window_hours, limit);
        let built = builder::build(&descriptor, &self.catalog, &filter);
        tracing::debug!("query {}: {}", table, built.sql);
        let rows = self.store.execute_read(&built.sql, &built.params)?;

        Ok(QueryOutput {
            experiment: experiment.to_string(),
            table: table.to_string(),
            returned_rows: rows.len(),
            applied_filters: built.applied,
            rows,
        })
    }

    /// Run a caller-supplied statement after guard validation.
    pub fn raw_query(&self, sql: &str, limit: usize) -> Result<RawQueryOutput> {
        let guarded = guard::validate(sql, limit)?;
        tracing::debug!("raw query: {}", guarded.sql);
        let rows = self.store.execute_read(&guarded.sql, &[])?;

        Ok(RawQueryOutput {
            executed_sql: guarded.sql,
            limit_appended: guarded.limit_appended,
            returned_rows: rows.len(),
            rows,
        })
    }

    /// Cross-table status report for one experiment.
    pub fn summarize(&self, experiment: &str, window_days: u32) -> Result<SummaryReport> {
        Summarizer::new(&self.store, &self.catalog).summarize(experiment, window_days)
    }
}

fn require_table<'a>(table: Option<&'a str>, mode: &str) -> Result<&'a str> {
    table.ok_or_else(|| Error::Config(format!("inspect mode `{}` requires a table name", mode)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn fixture_engine(dir: &TempDir) -> DataEngine {
        let path = dir.path().join("pioreactor.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE od_readings_filtered (
                experiment TEXT,
                pioreactor_unit TEXT,
                timestamp TEXT,
                normalized_od_reading REAL
            );
            INSERT INTO od_readings_filtered VALUES
                ('exp1', 'worker1', datetime('now', '-1 hours'), 0.41),
                ('exp1', 'worker1', datetime('now', '-2 hours'), 0.40),
                ('exp1', 'worker2', datetime('now', '-1 hours'), 0.39),
                ('exp1', 'worker1', datetime('now', '-100 hours'), 0.10);
            "#,
        )
        .unwrap();
        DataEngine::new(SqliteStore::new(path), Catalog::default())
    }

    #[test]
    fn test_query_filters_by_experiment_and_window() {
        let dir = TempDir::new().unwrap();
        let engine = fixture_engine(&dir);

        // exp1 has 4 rows but only 3 inside the last 24h.
        let output = engine.query("exp1", "od_readings_filtered", 50, 24).unwrap();
        assert_eq!(output.returned_rows, 3);
        assert_eq!(output.applied_filters.entity_column.as_deref(), Some("experiment"));
        assert!(output.applied_filters.ordered_by_time);

        // Unknown experiment: zero rows is a success, not an error.
        let output = engine.query("exp2", "od_readings_filtered", 50, 24).unwrap();
        assert_eq!(output.returned_rows, 0);
    }

    #[test]
    fn test_query_rows_ordered_newest_first() {
        let dir = TempDir::new().unwrap();
        let engine = fixture_engine(&dir);

        let output = engine.query("exp1", "od_readings_filtered", 50, 200).unwrap();
        let times: Vec<&str> = output
            .rows
            .iter()
            .map(|r| r["timestamp"].as_str().unwrap())
            .collect();
        let mut sorted = times.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(times, sorted);
    }

    #[test]
    fn test_query_unknown_table() {
        let dir = TempDir::new().unwrap();
        let engine = fixture_engine(&dir);

        let err = engine.query("exp1", "no_such_table", 50, 24).unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));
    }

    #[test]
    fn test_inspect_columns_missing_table_is_error() {
        let dir = TempDir::new().unwrap();
        let engine = fixture_engine(&dir);

        let err = engine.inspect(InspectMode::Columns, Some("ghost"), None).unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));

        let columns = engine
            .inspect(InspectMode::Columns, Some("od_readings_filtered"), None)
            .unwrap();
        assert_eq!(columns["columns"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_inspect_tables_and_sample() {
        let dir = TempDir::new().unwrap();
        let engine = fixture_engine(&dir);

        let tables = engine.inspect(InspectMode::Tables, None, None).unwrap();
        assert_eq!(tables["table_count"], 1);

        let sample = engine
            .inspect(InspectMode::Sample, Some("od_readings_filtered"), Some(2))
            .unwrap();
        assert_eq!(sample["returned_rows"], 2);
    }

    #[test]
    fn test_raw_query_lowercase_select() {
        let dir = TempDir::new().unwrap();
        let engine = fixture_engine(&dir);

        let output = engine.raw_query("select name from sqlite_master", 100).unwrap();
        assert_eq!(output.returned_rows, 1);
        assert!(output.limit_appended);
    }

    #[test]
    fn test_raw_query_rejection() {
        let dir = TempDir::new().unwrap();
        let engine = fixture_engine(&dir);

        let err = engine
            .raw_query("SELECT 1; DROP TABLE od_readings_filtered", 100)
            .unwrap_err();
        assert!(matches!(err, Error::RejectedStatement(_)));
    }

    #[test]
    fn test_empty_store_file_unavailable_everywhere() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.sqlite");
        std::fs::write(&path, b"").unwrap();
        let engine = DataEngine::new(SqliteStore::new(&path), Catalog::default());

        for result in [
            engine.inspect(InspectMode::Tables, None, None).map(|_| ()),
            engine.query("exp1", "od_readings_filtered", 50, 24).map(|_| ()),
            engine.raw_query("SELECT 1", 100).map(|_| ()),
            engine.summarize("exp1", 7).map(|_| ()),
        ] {
            let err = result.unwrap_err();
            assert!(matches!(err, Error::StoreUnavailable(_)));
            assert!(err.to_string().contains("empty.sqlite"));
        }
    }

    #[test]
    fn test_query_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let engine = fixture_engine(&dir);

        let first =
            serde_json::to_value(engine.query("exp1", "od_readings_filtered", 50, 24).unwrap())
                .unwrap();
        let second =
            serde_json::to_value(engine.query("exp1", "od_readings_filtered", 50, 24).unwrap())
                .unwrap();
        assert_eq!(first, second);
    }
}
