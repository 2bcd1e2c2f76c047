//! MySQL Driver Implementation
//!
//! # Features
//! - Client-server connections via TCP (`mysql://` URLs, MariaDB included)
//! - Catalog via `information_schema.columns`, system schemas excluded
//! - Identifiers quoted with backticks
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - Connections are opened, used, and closed within each call
//! - Text protocol; binary values that are not UTF-8 are Base64-encoded
//! - Whether a statement returns rows is decided from its leading keyword,
//!   which validation has already restricted to SELECT/INSERT/UPDATE/DELETE

use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Row, Value};
use serde_json::Map;

use crate::config::DatabaseDetails;
use crate::engine::context::{BackendContext, CatalogRow, DatabaseCatalog, QuoteStyle};
use crate::error::{ParleyError, Result};
use crate::validation::leading_keyword;

const CATALOG_QUERY: &str = "
    SELECT table_schema, table_name, column_name, data_type,
           CAST(ordinal_position AS SIGNED)
    FROM information_schema.columns
    WHERE table_schema NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')";

type CatalogTuple = (String, String, String, String, i64);

pub struct MySqlDriver {
    opts: Opts,
}

impl MySqlDriver {
    /// Parse the connection URL and resolve the password
    pub fn new(details: &DatabaseDetails) -> Result<Self> {
        let opts = Opts::from_url(&details.connection_string)
            .map_err(|e| ParleyError::config(format!("Invalid MySQL connection URL: {e}")))?;

        let opts = match details.resolve_password()? {
            Some(password) => Opts::from(OptsBuilder::from_opts(opts).pass(Some(password))),
            None => opts,
        };

        Ok(Self { opts })
    }

    async fn connect(&self) -> std::result::Result<Conn, mysql_async::Error> {
        Conn::new(self.opts.clone()).await
    }

    pub async fn check_authentication(&self) -> Result<()> {
        let mut conn = self
            .connect()
            .await
            .map_err(|e| ParleyError::auth(format!("Failed to connect to MySQL: {e}")))?;

        conn.ping().await.map_err(|e| ParleyError::auth(format!("MySQL ping failed: {e}")))?;
        let _ = conn.disconnect().await;
        Ok(())
    }

    pub async fn build_context(&self) -> Result<BackendContext> {
        let mut conn = self
            .connect()
            .await
            .map_err(|e| ParleyError::context(format!("Failed to connect to MySQL: {e}")))?;

        let rows: Vec<CatalogTuple> = conn
            .query(CATALOG_QUERY)
            .await
            .map_err(|e| ParleyError::context(format!("Failed to read MySQL catalog: {e}")))?;
        let _ = conn.disconnect().await;

        let catalog = rows
            .into_iter()
            .map(|(schema, table, column, data_type, ordinal)| CatalogRow {
                schema,
                table,
                column,
                data_type,
                ordinal,
            })
            .collect();

        Ok(BackendContext::Database(DatabaseCatalog::from_rows(
            "MySQL",
            QuoteStyle::Backtick,
            catalog,
        )))
    }

    pub async fn execute(&self, query: &str) -> Result<Vec<u8>> {
        let mut conn = self
            .connect()
            .await
            .map_err(|e| ParleyError::execution(format!("Failed to connect to MySQL: {e}")))?;

        let records = execute_query(&mut conn, query).await?;

        conn.disconnect()
            .await
            .map_err(|e| ParleyError::execution(format!("Failed to disconnect: {e}")))?;

        serde_json::to_vec(&records)
            .map_err(|e| ParleyError::execution(format!("Failed to serialize rows: {e}")))
    }
}

/// Execute query and return JSON records
async fn execute_query(conn: &mut Conn, query: &str) -> Result<Vec<Map<String, serde_json::Value>>> {
    if leading_keyword(query) == "SELECT" {
        let rows: Vec<Row> = conn
            .query(query)
            .await
            .map_err(|e| ParleyError::execution(format!("Failed to execute query: {e}")))?;

        return rows.iter().map(row_to_json).collect();
    }

    let result = conn
        .query_iter(query)
        .await
        .map_err(|e| ParleyError::execution(format!("Failed to execute query: {e}")))?;
    let rows_affected = result.affected_rows();

    // Drop the result to close it
    drop(result);

    let mut record = Map::new();
    record.insert("rows_affected".to_string(), serde_json::Value::from(rows_affected));
    Ok(vec![record])
}

/// Convert a MySQL row to an ordered JSON record
fn row_to_json(row: &Row) -> Result<Map<String, serde_json::Value>> {
    let mut record = Map::new();
    for (idx, column) in row.columns_ref().iter().enumerate() {
        record.insert(column.name_str().to_string(), mysql_value_to_json(row, idx)?);
    }
    Ok(record)
}

/// Convert MySQL value to JSON value
fn mysql_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    let value = row
        .as_ref(idx)
        .ok_or_else(|| ParleyError::execution(format!("Failed to get value at index {idx}")))?;

    Ok(value_to_json(value))
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        },

        Value::Int(i) => serde_json::Value::from(*i),
        Value::UInt(u) => serde_json::Value::from(*u),

        // NaN/Infinity as null
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Date(year, month, day, hour, minute, second, micro) => serde_json::Value::String(format!(
            "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"
        )),

        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!("{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"))
        }
    }
}
