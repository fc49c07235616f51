//! # Biolens - Bioreactor Experiment Data Explorer
//!
//! Schema-aware, strictly read-only query engine for bioreactor experiment
//! databases (Pioreactor-style SQLite stores).
//!
//! Biolens provides:
//! - Short-lived read-only access to a store other processes keep writing to
//! - Live schema introspection (tables, columns, samples) with no cached state
//! - A lexical guard that only lets bounded SELECT statements through
//! - Column-aware query building that adapts filters to the live schema
//! - Cross-table experiment summarization tolerant of missing/empty tables
//! - An MCP stdio server exposing all of the above to LLM agents

pub mod config;
pub mod introspect;
pub mod query;
pub mod server;
pub mod store;

// Re-exports for convenient access
pub use config::Catalog;
pub use introspect::{ColumnDescriptor, Introspector, TableDescriptor};
pub use query::DataEngine;
pub use store::SqliteStore;

/// Result type alias for Biolens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Biolens operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store file missing, empty, or not a SQLite database. Fatal to the
    /// current call; never retried.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unknown table: {0} (use inspect to list tables first)")]
    UnknownTable(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// The Statement Guard refused a raw statement; the message names the
    /// violated rule.
    #[error("Statement rejected: {0}")]
    RejectedStatement(String),

    /// Underlying engine failure, surfaced with the original message.
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Short machine-readable tag used in structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::UnknownTable(_) => "unknown_table",
            Error::UnknownColumn(_) => "unknown_column",
            Error::RejectedStatement(_) => "rejected_statement",
            Error::Store(_) => "store_error",
            Error::Io(_) => "io_error",
            Error::Config(_) => "config_error",
        }
    }
}
