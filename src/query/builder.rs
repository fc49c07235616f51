//! Table-Scoped Query Builder
//!
//! Builds statements adapted to the columns a table actually has. A filter
//! whose column is absent is dropped, and the drop is reported as a warning
//! so the caller can tell "no rows because no data" apart from "no rows
//! because your filter silently didn't apply".
//!
//! Invariant: table and column names go through identifier escaping and all
//! filter values are bound as parameters. Nothing caller-controlled is ever
//! concatenated raw into SQL text.

use rusqlite::types::Value as SqlValue;
use serde::Serialize;

use crate::config::Catalog;
use crate::introspect::TableDescriptor;
use crate::store::quote_identifier;
use crate::{Error, Result};

/// Structured filter for table-scoped queries.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    /// Experiment name to filter on, when the table carries one.
    pub entity: Option<String>,
    /// Recency window as a SQLite datetime modifier, e.g. `"-24 hours"`.
    /// Evaluated as `ts >= datetime('now', ?)` so the comparison happens in
    /// the store's own time domain.
    pub since: Option<String>,
    pub row_limit: usize,
}

impl QueryFilter {
    pub fn new(entity: Option<String>, since: Option<String>, row_limit: usize) -> Self {
        Self { entity, since, row_limit }
    }

    pub fn last_hours(entity: impl Into<String>, hours: u32, row_limit: usize) -> Self {
        Self::new(Some(entity.into()), Some(format!("-{} hours", hours)), row_limit)
    }

    pub fn last_days(entity: impl Into<String>, days: u32, row_limit: usize) -> Self {
        Self::new(Some(entity.into()), Some(format!("-{} days", days)), row_limit)
    }
}

/// Which parts of the filter actually applied to the built statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppliedFilterReport {
    pub entity_column: Option<String>,
    pub timestamp_column: Option<String>,
    pub ordered_by_time: bool,
    pub warnings: Vec<String>,
}

/// A ready-to-execute statement with its bound parameters.
#[derive(Debug)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub applied: AppliedFilterReport,
}

/// Build a row-select over one table, adapting the filter to its columns.
pub fn build(descriptor: &TableDescriptor, catalog: &Catalog, filter: &QueryFilter) -> BuiltQuery {
    let mut applied = AppliedFilterReport::default();
    let (clauses, mut params) = where_clauses(descriptor, catalog, filter, &mut applied);

    let mut sql = format!("SELECT * FROM {}", quote_identifier(&descriptor.name));
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if let Some(ts) = &applied.timestamp_column {
        sql.push_str(&format!(" ORDER BY {} DESC", quote_identifier(ts)));
        applied.ordered_by_time = true;
    }

    sql.push_str(" LIMIT ?");
    // A plain `as i64` cast would wrap huge values to a negative number,
    // and LIMIT -1 means unlimited in SQLite.
    params.push(SqlValue::Integer(
        i64::try_from(filter.row_limit).unwrap_or(i64::MAX),
    ));

    BuiltQuery { sql, params, applied }
}

/// Build the availability aggregate the summarizer runs per table:
/// row count, time range, and distinct-unit count, under the same
/// column-conditional filters as `build`.
pub fn build_availability(
    descriptor: &TableDescriptor,
    catalog: &Catalog,
    filter: &QueryFilter,
) -> BuiltQuery {
    let mut applied = AppliedFilterReport::default();
    let (clauses, params) = where_clauses(descriptor, catalog, filter, &mut applied);

    let mut selects = vec!["COUNT(*) AS row_count".to_string()];
    if let Some(ts) = &applied.timestamp_column {
        let ts = quote_identifier(ts);
        selects.push(format!("MIN({}) AS first_timestamp", ts));
        selects.push(format!("MAX({}) AS last_timestamp", ts));
    }
    if let Some(unit) = descriptor.find_column(&catalog.unit_columns) {
        selects.push(format!(
            "COUNT(DISTINCT {}) AS distinct_units",
            quote_identifier(&unit.name)
        ));
    }

    let mut sql = format!(
        "SELECT {} FROM {}",
        selects.join(", "),
        quote_identifier(&descriptor.name)
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    BuiltQuery { sql, params, applied }
}

/// Build the per-unit grouped statistics query for a primary table's
/// designated numeric column.
pub fn build_key_metrics(
    descriptor: &TableDescriptor,
    catalog: &Catalog,
    value_column: &str,
    filter: &QueryFilter,
) -> Result<BuiltQuery> {
    if descriptor.columns.iter().all(|c| c.name != value_column) {
        return Err(Error::UnknownColumn(format!(
            "{}.{}",
            descriptor.name, value_column
        )));
    }

    let mut applied = AppliedFilterReport::default();
    let (clauses, params) = where_clauses(descriptor, catalog, filter, &mut applied);

    let value = quote_identifier(value_column);
    let mut selects = vec![
        "COUNT(*) AS samples".to_string(),
        format!("AVG({}) AS mean", value),
        format!("MIN({}) AS min", value),
        format!("MAX({}) AS max", value),
    ];

    let unit = descriptor.find_column(&catalog.unit_columns).map(|c| c.name.clone());
    if let Some(unit) = &unit {
        selects.insert(0, format!("{} AS unit", quote_identifier(unit)));
    }

    let mut sql = format!(
        "SELECT {} FROM {}",
        selects.join(", "),
        quote_identifier(&descriptor.name)
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    if let Some(unit) = &unit {
        let unit = quote_identifier(unit);
        sql.push_str(&format!(" GROUP BY {} ORDER BY {}", unit, unit));
    }

    Ok(BuiltQuery { sql, params, applied })
}

fn where_clauses(
    descriptor: &TableDescriptor,
    catalog: &Catalog,
    filter: &QueryFilter,
    applied: &mut AppliedFilterReport,
) -> (Vec<String>, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(entity) = &filter.entity {
        match descriptor.find_column(&catalog.entity_columns) {
            Some(column) => {
                clauses.push(format!("{} = ?", quote_identifier(&column.name)));
                params.push(SqlValue::Text(entity.clone()));
                applied.entity_column = Some(column.name.clone());
            }
            None => applied.warnings.push(format!(
                "experiment filter skipped: table `{}` has no experiment column",
                descriptor.name
            )),
        }
    }

    if let Some(since) = &filter.since {
        match descriptor.find_column(&catalog.timestamp_columns) {
            Some(column) => {
                clauses.push(format!(
                    "{} >= datetime('now', ?)",
                    quote_identifier(&column.name)
                ));
                params.push(SqlValue::Text(since.clone()));
                applied.timestamp_column = Some(column.name.clone());
            }
            None => applied.warnings.push(format!(
                "time window skipped: table `{}` has no timestamp column",
                descriptor.name
            )),
        }
    }

    // Ordering wants the timestamp column even when no window was asked for.
    if applied.timestamp_column.is_none() {
        applied.timestamp_column = descriptor
            .find_column(&catalog.timestamp_columns)
            .map(|c| c.name.clone());
    }

    (clauses, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::ColumnDescriptor;

    fn descriptor(name: &str, columns: &[&str]) -> TableDescriptor {
        TableDescriptor {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnDescriptor {
                    name: c.to_string(),
                    declared_type: Some("TEXT".to_string()),
                    nullable: true,
                    is_primary_key: false,
                })
                .collect(),
            row_count: None,
        }
    }

    #[test]
    fn test_full_filter_applies() {
        let desc = descriptor(
            "od_readings",
            &["experiment", "pioreactor_unit", "timestamp", "od_reading"],
        );
        let built = build(&desc, &Catalog::default(), &QueryFilter::last_hours("exp1", 24, 50));

        assert_eq!(
            built.sql,
            "SELECT * FROM \"od_readings\" WHERE \"experiment\" = ? \
             AND \"timestamp\" >= datetime('now', ?) ORDER BY \"timestamp\" DESC LIMIT ?"
        );
        assert_eq!(built.params.len(), 3);
        assert!(built.applied.warnings.is_empty());
        assert!(built.applied.ordered_by_time);
    }

    #[test]
    fn test_missing_columns_warn_and_omit() {
        let desc = descriptor("kv_cache", &["key", "value"]);
        let built = build(&desc, &Catalog::default(), &QueryFilter::last_hours("exp1", 24, 50));

        assert_eq!(built.sql, "SELECT * FROM \"kv_cache\" LIMIT ?");
        assert_eq!(built.params.len(), 1);
        assert_eq!(built.applied.warnings.len(), 2);
        assert!(built.applied.warnings[0].contains("experiment filter skipped"));
        assert!(built.applied.warnings[1].contains("time window skipped"));
    }

    #[test]
    fn test_huge_row_limit_stays_bounded() {
        let desc = descriptor("od_readings", &["experiment", "timestamp"]);
        let built = build(
            &desc,
            &Catalog::default(),
            &QueryFilter::new(None, None, usize::MAX),
        );

        // The bound LIMIT value must never go negative (SQLite reads
        // LIMIT -1 as "no limit").
        match built.params.last().unwrap() {
            SqlValue::Integer(n) => assert!(*n > 0),
            other => panic!("expected integer limit, got {:?}", other),
        }
    }

    #[test]
    fn test_identifiers_are_escaped() {
        let desc = descriptor("weird\"table", &["experiment"]);
        let built = build(
            &desc,
            &Catalog::default(),
            &QueryFilter::new(Some("exp1".to_string()), None, 10),
        );
        assert!(built.sql.contains("\"weird\"\"table\""));
    }

    #[test]
    fn test_availability_adapts_to_columns() {
        let desc = descriptor("dosing_events", &["experiment", "timestamp"]);
        let built = build_availability(
            &desc,
            &Catalog::default(),
            &QueryFilter::last_days("exp1", 7, 0),
        );

        assert!(built.sql.contains("COUNT(*) AS row_count"));
        assert!(built.sql.contains("MIN(\"timestamp\") AS first_timestamp"));
        // No unit column: no distinct-unit aggregate.
        assert!(!built.sql.contains("distinct_units"));
    }

    #[test]
    fn test_key_metrics_requires_value_column() {
        let desc = descriptor("temperature_readings", &["experiment", "pioreactor_unit"]);
        let err = build_key_metrics(
            &desc,
            &Catalog::default(),
            "temperature",
            &QueryFilter::last_days("exp1", 7, 0),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(_)));
    }

    #[test]
    fn test_key_metrics_groups_by_unit() {
        let desc = descriptor(
            "temperature_readings",
            &["experiment", "pioreactor_unit", "timestamp", "temperature"],
        );
        let built = build_key_metrics(
            &desc,
            &Catalog::default(),
            "temperature",
            &QueryFilter::last_days("exp1", 7, 0),
        )
        .unwrap();

        assert!(built.sql.contains("GROUP BY \"pioreactor_unit\""));
        assert!(built.sql.contains("AVG(\"temperature\") AS mean"));
    }
}
