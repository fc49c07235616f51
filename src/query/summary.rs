//! Cross-Table Summarizer
//!
//! Harvests per-table availability, time range, and basic statistics for one
//! experiment across the configured catalog of candidate tables, and merges
//! them into a single report. The central property is failure isolation: a
//! table that is missing, empty, or broken degrades its own entry and never
//! aborts the rest of the report.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value as Json, json};

use crate::config::Catalog;
use crate::introspect::{Introspector, TableDescriptor};
use crate::query::builder::{self, QueryFilter};
use crate::store::SqliteStore;
use crate::{Error, Result};

/// Per-table outcome of summarization.
///
/// Absence of data is a modeled outcome, not an error: `no_data` and
/// `table_not_exists` are normal states for a partially populated store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available {
        rows: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        distinct_units: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        first_timestamp: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_timestamp: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    NoData,
    TableNotExists,
    Error { message: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }
}

#[derive(Debug, Serialize)]
pub struct Assessment {
    pub has_data: bool,
    pub data_types_available: Vec<String>,
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub experiment: String,
    pub window_days: u32,
    pub tables: BTreeMap<String, Availability>,
    /// Per-unit grouped statistics for the primary tables that had data.
    pub key_metrics: BTreeMap<String, Json>,
    pub assessment: Assessment,
}

pub struct Summarizer<'a> {
    store: &'a SqliteStore,
    catalog: &'a Catalog,
}

impl<'a> Summarizer<'a> {
    pub fn new(store: &'a SqliteStore, catalog: &'a Catalog) -> Self {
        Self { store, catalog }
    }

    pub fn summarize(&self, experiment: &str, window_days: u32) -> Result<SummaryReport> {
        let introspector = Introspector::new(self.store);
        let filter = QueryFilter::last_days(experiment, window_days, 0);

        let mut tables = BTreeMap::new();
        let mut descriptors: BTreeMap<String, TableDescriptor> = BTreeMap::new();

        for table in self.catalog.candidate_tables() {
            let availability = match introspector.descriptor(table) {
                Ok(None) => Availability::TableNotExists,
                Ok(Some(descriptor)) => {
                    let availability = self.table_availability(&descriptor, &filter);
                    if availability.is_available() {
                        descriptors.insert(table.to_string(), descriptor);
                    }
                    availability
                }
                // A dead store fails the whole call; anything else is
                // isolated to this table's entry.
                Err(e @ Error::StoreUnavailable(_)) => return Err(e),
                Err(e) => Availability::Error { message: e.to_string() },
            };
            tables.insert(table.to_string(), availability);
        }

        let mut key_metrics = BTreeMap::new();
        for spec in &self.catalog.key_metrics {
            let Some(descriptor) = descriptors.get(&spec.table) else {
                continue;
            };
            key_metrics.insert(
                spec.table.clone(),
                self.table_key_metrics(descriptor, &spec.value_column, &filter),
            );
        }

        let data_types_available: Vec<String> = tables
            .iter()
            .filter(|(_, a)| a.is_available())
            .map(|(name, _)| name.clone())
            .collect();

        Ok(SummaryReport {
            experiment: experiment.to_string(),
            window_days,
            assessment: Assessment {
                has_data: !data_types_available.is_empty(),
                data_types_available,
                note: "Tables with no_data or table_not_exists are expected for \
                       experiments that don't use those jobs; this is not an error."
                    .to_string(),
            },
            tables,
            key_metrics,
        })
    }

    fn table_availability(
        &self,
        descriptor: &TableDescriptor,
        filter: &QueryFilter,
    ) -> Availability {
        let built = builder::build_availability(descriptor, self.catalog, filter);
        let rows = match self.store.execute_read(&built.sql, &built.params) {
            Ok(rows) => rows,
            Err(e) => return Availability::Error { message: e.to_string() },
        };

        let Some(row) = rows.first() else {
            return Availability::NoData;
        };
        let count = row.get("row_count").and_then(|v| v.as_i64()).unwrap_or(0);
        if count == 0 {
            return Availability::NoData;
        }

        let text = |key: &str| {
            row.get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Availability::Available {
            rows: count,
            distinct_units: row.get("distinct_units").and_then(|v| v.as_i64()),
            first_timestamp: text("first_timestamp"),
            last_timestamp: text("last_timestamp"),
            warnings: built.applied.warnings,
        }
    }

    /// Secondary statistics query; its failure degrades to an error entry
    /// inside the key_metrics bucket only.
    fn table_key_metrics(
        &self,
        descriptor: &TableDescriptor,
        value_column: &str,
        filter: &QueryFilter,
    ) -> Json {
        let built = match builder::build_key_metrics(descriptor, self.catalog, value_column, filter)
        {
            Ok(built) => built,
            Err(e) => return json!({ "error": e.to_string() }),
        };
        match self.store.execute_read(&built.sql, &built.params) {
            Ok(rows) => json!({ "value_column": value_column, "per_unit": rows }),
            Err(e) => json!({ "error": e.to_string() }),
        }
    }
}
