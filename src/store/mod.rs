//! Store Layer - short-lived read-only SQLite access
//!
//! The experiment store is written by other processes while we read it, so
//! every operation opens its own read-only connection and closes it on
//! return. Nothing here can write a row.

pub mod sqlite;

pub use sqlite::{Row, SqliteStore, quote_identifier};
