//! `SQLite` Driver Implementation
//!
//! # Features
//! - File-based databases (and `:memory:` for scratch use)
//! - Catalog via `sqlite_master` joined with `pragma_table_info`
//! - Result sets serialized as JSON records in column order
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous); every call runs on the blocking pool
//! - Connections are opened, used, and closed within each call
//! - The database file must already exist; it is never created
//! - BLOB data is Base64-encoded for JSON safety

use rusqlite::{Connection, OpenFlags, Row};
use serde_json::{Map, Value};

use crate::config::DatabaseDetails;
use crate::engine::context::{BackendContext, CatalogRow, DatabaseCatalog, QuoteStyle};
use crate::error::{ParleyError, Result};

/// Schema name `SQLite` reports for the main database
const MAIN_SCHEMA: &str = "main";

const CATALOG_QUERY: &str = "
    SELECT m.name, p.name, p.type, p.cid
    FROM sqlite_master AS m
    JOIN pragma_table_info(m.name) AS p
    WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'";

pub struct SqliteDriver {
    path: String,
}

impl SqliteDriver {
    pub fn new(details: &DatabaseDetails) -> Result<Self> {
        let raw = details.connection_string.trim();
        let path = raw
            .strip_prefix("sqlite://")
            .or_else(|| raw.strip_prefix("sqlite:"))
            .unwrap_or(raw)
            .to_string();

        if path.is_empty() {
            return Err(ParleyError::config("SQLite requires a database file path"));
        }

        Ok(Self { path })
    }

    pub async fn check_authentication(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| ParleyError::auth(format!("SQLite database is not readable: {e}")))
        }, ParleyError::Auth)
        .await
    }

    pub async fn build_context(&self) -> Result<BackendContext> {
        let rows = self
            .blocking(|conn| {
                read_catalog(conn)
                    .map_err(|e| ParleyError::context(format!("Failed to read SQLite catalog: {e}")))
            }, ParleyError::Context)
            .await?;

        Ok(BackendContext::Database(DatabaseCatalog::from_rows(
            "SQLite",
            QuoteStyle::DoubleQuote,
            rows,
        )))
    }

    pub async fn execute(&self, query: &str) -> Result<Vec<u8>> {
        let query = query.to_string();
        let records = self.blocking(move |conn| execute_query(conn, &query), ParleyError::Execution).await?;

        serde_json::to_vec(&records)
            .map_err(|e| ParleyError::execution(format!("Failed to serialize rows: {e}")))
    }

    /// Open a connection on the blocking pool and run `f` with it
    ///
    /// `open_error` builds the error for a failed open, so each operation
    /// reports it under its own kind.
    async fn blocking<T, F>(&self, f: F, open_error: fn(String) -> ParleyError) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&path).map_err(open_error)?;
            f(&conn)
        })
        .await
        .map_err(|e| ParleyError::execution(format!("SQLite task failed: {e}")))?
    }
}

/// Open an existing `SQLite` database read-write
fn open_connection(path: &str) -> std::result::Result<Connection, String> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI;
    Connection::open_with_flags(path, flags)
        .map_err(|e| format!("Failed to open SQLite database: {e}"))
}

fn read_catalog(conn: &Connection) -> rusqlite::Result<Vec<CatalogRow>> {
    let mut stmt = conn.prepare(CATALOG_QUERY)?;
    let rows = stmt.query_map([], |row| {
        Ok(CatalogRow {
            schema: MAIN_SCHEMA.to_string(),
            table: row.get(0)?,
            column: row.get(1)?,
            data_type: row.get::<_, String>(2).map(|t| if t.is_empty() { "ANY".to_string() } else { t })?,
            ordinal: row.get::<_, i64>(3)? + 1,
        })
    })?;
    rows.collect()
}

/// Execute query and return JSON records
///
/// Statements without a result set yield a single `rows_affected` record.
fn execute_query(conn: &Connection, query: &str) -> Result<Vec<Map<String, Value>>> {
    let mut stmt = conn
        .prepare(query)
        .map_err(|e| ParleyError::execution(format!("Failed to prepare query: {e}")))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    if column_names.is_empty() {
        let affected = stmt
            .execute([])
            .map_err(|e| ParleyError::execution(format!("Failed to execute query: {e}")))?;

        let mut record = Map::new();
        record.insert("rows_affected".to_string(), Value::from(affected));
        return Ok(vec![record]);
    }

    let rows = stmt
        .query_map([], |row| row_to_json(&column_names, row))
        .map_err(|e| ParleyError::execution(format!("Failed to execute query: {e}")))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| ParleyError::execution(format!("Failed to fetch row: {e}")))
}

/// Convert a `SQLite` row to an ordered JSON record
fn row_to_json(column_names: &[String], row: &Row) -> rusqlite::Result<Map<String, Value>> {
    let mut record = Map::new();
    for (idx, name) in column_names.iter().enumerate() {
        record.insert(name.clone(), sqlite_value_to_json(row, idx)?);
    }
    Ok(record)
}

fn sqlite_value_to_json(row: &Row, idx: usize) -> rusqlite::Result<Value> {
    use rusqlite::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number), // NaN/Infinity as null
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => {
            use base64::Engine;
            Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
