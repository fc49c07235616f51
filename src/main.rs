//! Biolens CLI - explore and summarize bioreactor experiment databases

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use biolens::config::{self, BiolensConfig, Catalog};
use biolens::query::{DataEngine, InspectMode};
use biolens::server::McpService;
use biolens::store::SqliteStore;

#[derive(Parser)]
#[command(name = "biolens")]
#[command(version = "0.1.0")]
#[command(about = "Schema-aware read-only explorer for bioreactor experiment databases")]
#[command(long_about = r#"
Biolens reads a Pioreactor-style experiment database and answers questions
about it without ever writing a row:
  • List live tables and columns (the schema varies per deployment)
  • Pull recent rows for one experiment from one table
  • Run guarded read-only SQL
  • Summarize data availability across all known tables

Example usage:
  biolens tables --database /var/lib/pioreactor/pioreactor.sqlite
  biolens query --experiment exp1 --table od_readings_filtered
  biolens summary --experiment exp1 --window-days 7
  biolens serve --database pioreactor.sqlite
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a biolens.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a biolens.toml with the default catalog, ready to edit
    Init {
        /// Where to write the config
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Serve the engine as MCP tools over stdio
    Serve {
        /// Path to the experiment database file (overrides the config file)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// List tables with row counts
    Tables {
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show column descriptors, for one table or the whole schema
    Schema {
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Table name (omit for all tables)
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Sample a few rows from a table
    Sample {
        #[arg(short, long)]
        database: Option<PathBuf>,

        #[arg(short, long)]
        table: String,

        /// Number of rows (clamped to 20)
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Recent rows from one table for one experiment
    Query {
        #[arg(short, long)]
        database: Option<PathBuf>,

        #[arg(short, long)]
        experiment: String,

        #[arg(short, long)]
        table: String,

        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Recency window in hours
        #[arg(short, long, default_value = "24")]
        window_hours: u32,
    },

    /// Run a guarded read-only SQL statement
    Sql {
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// The SELECT statement to run
        #[arg(short, long)]
        statement: String,

        /// Row ceiling appended when the statement has no LIMIT
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Cross-table data availability report for one experiment
    Summary {
        #[arg(short, long)]
        database: Option<PathBuf>,

        #[arg(short, long)]
        experiment: String,

        /// Recency window in days
        #[arg(short, long, default_value = "7")]
        window_days: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging. The MCP transport owns stdout, so logs go to stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::Init { path, force } = &cli.command {
        let path = path.clone().unwrap_or_else(config::default_config_path);
        let template = BiolensConfig {
            database: Some(config::default_database_path().display().to_string()),
            catalog: Some(Catalog::default()),
        };
        config::write_config(&path, &template, *force)?;
        tracing::info!("wrote {}", path.display());
        return Ok(());
    }

    let loaded = config::load_config(cli.config.as_deref())?;
    let catalog = loaded
        .as_ref()
        .and_then(|c| c.catalog.clone())
        .unwrap_or_default();
    let configured_db = loaded.and_then(|c| c.database).map(PathBuf::from);

    // The --database flag beats the config file, which beats the default.
    let engine = |flag: Option<PathBuf>| {
        let database = config::resolve_database(flag, configured_db.clone());
        DataEngine::new(SqliteStore::new(database), catalog.clone())
    };

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Serve { database } => {
            let engine = engine(database);
            tracing::info!("Serving MCP tools for {}", engine.store().path().display());
            let service = McpService::new(Arc::new(engine));
            service.run_stdio().await?;
        }

        Commands::Tables { database } => {
            let result = engine(database).inspect(InspectMode::Tables, None, None)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Schema { database, table } => {
            let engine = engine(database);
            let result = match table.as_deref() {
                Some(table) => engine.inspect(InspectMode::Columns, Some(table), None)?,
                None => engine.inspect(InspectMode::Schema, None, None)?,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Sample { database, table, limit } => {
            let result = engine(database).inspect(InspectMode::Sample, Some(&table), Some(limit))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Query { database, experiment, table, limit, window_hours } => {
            let output = engine(database).query(&experiment, &table, limit, window_hours)?;
            for warning in &output.applied_filters.warnings {
                tracing::warn!("{}", warning);
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Sql { database, statement, limit } => {
            let output = engine(database).raw_query(&statement, limit)?;
            if output.limit_appended {
                tracing::info!("no LIMIT clause; appended LIMIT {}", limit);
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Summary { database, experiment, window_days } => {
            let report = engine(database).summarize(&experiment, window_days)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
