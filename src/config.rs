//! Configuration: store location and the summarization catalog.
//!
//! The catalog is deployment vocabulary, not engine logic: which tables are
//! worth summarizing, which column names mean "experiment" / "unit" /
//! "timestamp", and which numeric columns carry the headline metrics. It is
//! injected into the engine so the same code can serve a store with a
//! different vocabulary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BiolensConfig {
    pub database: Option<String>,
    #[serde(default)]
    pub catalog: Option<Catalog>,
}

/// Candidate tables and column vocabulary used by the query builder and the
/// summarizer. Defaults describe a stock Pioreactor store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Time-series measurement tables.
    #[serde(default = "default_measurement_tables")]
    pub measurement_tables: Vec<String>,
    /// Discrete event tables.
    #[serde(default = "default_event_tables")]
    pub event_tables: Vec<String>,
    /// Column names that identify the experiment, in preference order.
    #[serde(default = "default_entity_columns")]
    pub entity_columns: Vec<String>,
    /// Column names that identify the bioreactor unit.
    #[serde(default = "default_unit_columns")]
    pub unit_columns: Vec<String>,
    /// Column names that carry the row timestamp.
    #[serde(default = "default_timestamp_columns")]
    pub timestamp_columns: Vec<String>,
    /// Primary tables whose designated numeric column gets per-unit
    /// grouped statistics in summary reports.
    #[serde(default = "default_key_metrics")]
    pub key_metrics: Vec<KeyMetricSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMetricSpec {
    pub table: String,
    pub value_column: String,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            measurement_tables: default_measurement_tables(),
            event_tables: default_event_tables(),
            entity_columns: default_entity_columns(),
            unit_columns: default_unit_columns(),
            timestamp_columns: default_timestamp_columns(),
            key_metrics: default_key_metrics(),
        }
    }
}

impl Catalog {
    /// All candidate tables in catalog order, measurements first,
    /// duplicates removed.
    pub fn candidate_tables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for table in self.measurement_tables.iter().chain(&self.event_tables) {
            if !seen.contains(&table.as_str()) {
                seen.push(table.as_str());
            }
        }
        seen
    }

}

fn default_measurement_tables() -> Vec<String> {
    [
        "od_readings",
        "od_readings_filtered",
        "growth_rates",
        "temperature_readings",
        "stirring_rates",
        "alt_media_fractions",
        "pid_logs",
    ]
    .map(String::from)
    .to_vec()
}

fn default_event_tables() -> Vec<String> {
    ["dosing_events", "led_change_events", "experiment_events", "logs"]
        .map(String::from)
        .to_vec()
}

fn default_entity_columns() -> Vec<String> {
    vec!["experiment".to_string()]
}

fn default_unit_columns() -> Vec<String> {
    vec!["pioreactor_unit".to_string(), "unit".to_string()]
}

fn default_timestamp_columns() -> Vec<String> {
    vec![
        "timestamp".to_string(),
        "created_at".to_string(),
        "timestamp_localtime".to_string(),
    ]
}

fn default_key_metrics() -> Vec<KeyMetricSpec> {
    vec![
        KeyMetricSpec {
            table: "od_readings_filtered".to_string(),
            value_column: "normalized_od_reading".to_string(),
        },
        KeyMetricSpec {
            table: "temperature_readings".to_string(),
            value_column: "temperature".to_string(),
        },
        KeyMetricSpec {
            table: "growth_rates".to_string(),
            value_column: "rate".to_string(),
        },
        KeyMetricSpec {
            table: "stirring_rates".to_string(),
            value_column: "measured_rpm".to_string(),
        },
    ]
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("biolens.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("pioreactor.sqlite")
}

/// Pick the database path: an explicit CLI flag wins over the config file,
/// which wins over the stock Pioreactor location.
pub fn resolve_database(flag: Option<PathBuf>, configured: Option<PathBuf>) -> PathBuf {
    flag.or(configured).unwrap_or_else(default_database_path)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<BiolensConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: BiolensConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &BiolensConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_tables_dedup_and_order() {
        let mut catalog = Catalog::default();
        catalog.event_tables.push("od_readings".to_string());

        let tables = catalog.candidate_tables();
        assert_eq!(tables[0], "od_readings");
        assert_eq!(tables.iter().filter(|t| **t == "od_readings").count(), 1);
    }

    #[test]
    fn test_resolve_database_precedence() {
        let flag = PathBuf::from("/tmp/flag.sqlite");
        let configured = PathBuf::from("/tmp/configured.sqlite");

        assert_eq!(
            resolve_database(Some(flag.clone()), Some(configured.clone())),
            flag
        );
        assert_eq!(resolve_database(None, Some(configured.clone())), configured);
        assert_eq!(resolve_database(None, None), default_database_path());
    }

    #[test]
    fn test_write_config_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("biolens.toml");

        let config = BiolensConfig {
            database: Some("/var/lib/pioreactor/pioreactor.sqlite".to_string()),
            catalog: Some(Catalog::default()),
        };
        write_config(&path, &config, false).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.database, config.database);
        assert_eq!(
            loaded.catalog.unwrap().measurement_tables,
            default_measurement_tables()
        );
    }

    #[test]
    fn test_write_config_refuses_overwrite_without_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("biolens.toml");
        let config = BiolensConfig::default();

        write_config(&path, &config, false).unwrap();
        let err = write_config(&path, &config, false).unwrap_err();
        assert!(err.to_string().contains("--force"));

        write_config(&path, &config, true).unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BiolensConfig = toml::from_str(
            r#"
            database = "/var/lib/pioreactor/pioreactor.sqlite"

            [catalog]
            measurement_tables = ["od_readings"]
            "#,
        )
        .unwrap();

        let catalog = config.catalog.unwrap();
        assert_eq!(catalog.measurement_tables, vec!["od_readings"]);
        assert_eq!(catalog.entity_columns, vec!["experiment"]);
        assert!(!catalog.event_tables.is_empty());
    }
}
