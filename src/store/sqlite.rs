//! Read-only SQLite store handle

use std::io::Read;
use std::path::{Path, PathBuf};

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde_json::Value as Json;

use crate::{Error, Result};

/// First 16 bytes of every SQLite 3 database file.
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// A result row as a column-name -> JSON value mapping.
pub type Row = serde_json::Map<String, Json>;

/// Handle to an on-disk experiment store.
///
/// Holds only the path; a fresh read-only connection is opened per call and
/// dropped on return. Other processes (data loggers, automations) write to
/// the same file concurrently, which is why no connection or schema state is
/// kept between calls.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Execute a read statement and collect all rows as JSON mappings.
    ///
    /// The connection is opened read-only, so even a statement that slipped
    /// past upstream guards cannot mutate the store.
    pub fn execute_read(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut mapping = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                mapping.insert(name.clone(), value_ref_to_json(row.get_ref(idx)?));
            }
            out.push(mapping);
        }
        Ok(out)
    }

    /// Open a read-only connection, verifying the file looks like a SQLite
    /// database first. Missing/empty/garbage files are `StoreUnavailable`,
    /// kept distinct from execution-time engine errors.
    fn connect(&self) -> Result<Connection> {
        self.check_format()?;
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    fn check_format(&self) -> Result<()> {
        let metadata = std::fs::metadata(&self.path).map_err(|_| {
            Error::StoreUnavailable(format!("database file not found: {}", self.path.display()))
        })?;
        if metadata.len() == 0 {
            return Err(Error::StoreUnavailable(format!(
                "database file is empty: {}",
                self.path.display()
            )));
        }

        let mut header = [0u8; 16];
        let mut file = std::fs::File::open(&self.path)?;
        if file.read_exact(&mut header).is_err() || &header != SQLITE_MAGIC {
            return Err(Error::StoreUnavailable(format!(
                "not a SQLite database: {}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// Escape an identifier for inclusion in SQL text.
///
/// Caller-supplied table names must never reach the statement text raw; this
/// double-quotes and doubles embedded quotes, which neutralizes any attempt
/// to break out of the identifier position.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Convert a SQLite value into its JSON representation.
fn value_ref_to_json(value: ValueRef<'_>) -> Json {
    match value {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).into_owned()),
        // Raw sensor blobs are not useful to an agent; report their size.
        ValueRef::Blob(b) => Json::String(format!("<blob: {} bytes>", b.len())),
    }
}
