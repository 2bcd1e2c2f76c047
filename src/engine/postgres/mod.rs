//! `PostgreSQL` Driver Implementation
//!
//! # Features
//! - Client-server connections via TCP (URL or key/value connection strings)
//! - Catalog via `information_schema.columns`, system schemas excluded
//! - Rich type system support (JSON/JSONB, timestamps, UUID, BYTEA)
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - Connections are opened, used, and closed within each call
//! - Statements are prepared first to learn their result columns; result sets
//!   whose column types all have a JSON mapping are decoded natively, anything
//!   else (NUMERIC, arrays, ranges...) goes through the simple query protocol
//!   and is returned as text
//! - BYTEA data is Base64-encoded for JSON safety

use std::str::FromStr;

use serde_json::{Map, Value};
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row, SimpleQueryMessage};

use crate::config::DatabaseDetails;
use crate::engine::context::{BackendContext, CatalogRow, DatabaseCatalog, QuoteStyle};
use crate::error::{ParleyError, Result};

const CATALOG_QUERY: &str = "
    SELECT table_schema::text, table_name::text, column_name::text, data_type::text,
           ordinal_position::int4
    FROM information_schema.columns
    WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
      AND table_schema NOT LIKE 'pg_toast%'
      AND table_schema NOT LIKE 'pg_temp%'";

/// Column types decoded natively
const NATIVE_TYPES: &[Type] = &[
    Type::BOOL,
    Type::INT2,
    Type::INT4,
    Type::INT8,
    Type::FLOAT4,
    Type::FLOAT8,
    Type::VARCHAR,
    Type::TEXT,
    Type::BPCHAR,
    Type::NAME,
    Type::JSON,
    Type::JSONB,
    Type::BYTEA,
    Type::TIMESTAMP,
    Type::TIMESTAMPTZ,
    Type::DATE,
    Type::TIME,
    Type::UUID,
];

pub struct PostgresDriver {
    config: Config,
}

impl PostgresDriver {
    /// Parse the connection string and resolve the password
    ///
    /// WARNING: the connection string may contain credentials, errors never echo it.
    pub fn new(details: &DatabaseDetails) -> Result<Self> {
        let mut config = Config::from_str(&details.connection_string)
            .map_err(|e| ParleyError::config(format!("Invalid PostgreSQL connection string: {e}")))?;

        if let Some(password) = details.resolve_password()? {
            config.password(password);
        }

        Ok(Self { config })
    }

    async fn connect(&self) -> std::result::Result<Client, tokio_postgres::Error> {
        let (client, connection) = self.config.connect(NoTls).await?;

        // Connection errors are not logged to prevent credential leakage
        tokio::spawn(async move {
            let _ = connection.await;
        });

        Ok(client)
    }

    pub async fn check_authentication(&self) -> Result<()> {
        let client = self
            .connect()
            .await
            .map_err(|e| ParleyError::auth(format!("Failed to connect to PostgreSQL: {e}")))?;

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| ParleyError::auth(format!("PostgreSQL ping failed: {e}")))?;
        Ok(())
    }

    pub async fn build_context(&self) -> Result<BackendContext> {
        let client = self
            .connect()
            .await
            .map_err(|e| ParleyError::context(format!("Failed to connect to PostgreSQL: {e}")))?;

        let rows = client
            .query(CATALOG_QUERY, &[])
            .await
            .map_err(|e| ParleyError::context(format!("Failed to read PostgreSQL catalog: {e}")))?;

        let catalog = rows
            .iter()
            .map(|row| CatalogRow {
                schema: row.get(0),
                table: row.get(1),
                column: row.get(2),
                data_type: row.get(3),
                ordinal: i64::from(row.get::<_, i32>(4)),
            })
            .collect();

        Ok(BackendContext::Database(DatabaseCatalog::from_rows(
            "PostgreSQL",
            QuoteStyle::DoubleQuote,
            catalog,
        )))
    }

    pub async fn execute(&self, query: &str) -> Result<Vec<u8>> {
        let client = self
            .connect()
            .await
            .map_err(|e| ParleyError::execution(format!("Failed to connect to PostgreSQL: {e}")))?;

        let records = execute_query(&client, query).await?;
        serde_json::to_vec(&records)
            .map_err(|e| ParleyError::execution(format!("Failed to serialize rows: {e}")))
    }
}

/// Execute query and return JSON records
async fn execute_query(client: &Client, query: &str) -> Result<Vec<Map<String, Value>>> {
    let stmt = client
        .prepare(query)
        .await
        .map_err(|e| ParleyError::execution(format!("Failed to prepare query: {e}")))?;

    // Statements without result columns (INSERT, UPDATE, DELETE)
    if stmt.columns().is_empty() {
        let rows_affected = client
            .execute(&stmt, &[])
            .await
            .map_err(|e| ParleyError::execution(format!("Failed to execute query: {e}")))?;

        let mut record = Map::new();
        record.insert("rows_affected".to_string(), Value::from(rows_affected));
        return Ok(vec![record]);
    }

    if stmt.columns().iter().all(|c| NATIVE_TYPES.contains(c.type_())) {
        let rows = client
            .query(&stmt, &[])
            .await
            .map_err(|e| ParleyError::execution(format!("Failed to execute query: {e}")))?;
        return rows.iter().map(row_to_json).collect();
    }

    execute_as_text(client, query).await
}

/// Run through the simple query protocol, every value as text
async fn execute_as_text(client: &Client, query: &str) -> Result<Vec<Map<String, Value>>> {
    let messages = client
        .simple_query(query)
        .await
        .map_err(|e| ParleyError::execution(format!("Failed to execute query: {e}")))?;

    let mut records = Vec::new();
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let mut record = Map::new();
            for (idx, column) in row.columns().iter().enumerate() {
                let value = row.get(idx).map_or(Value::Null, |s| Value::String(s.to_string()));
                record.insert(column.name().to_string(), value);
            }
            records.push(record);
        }
    }
    Ok(records)
}

fn row_to_json(row: &Row) -> Result<Map<String, Value>> {
    let mut record = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), postgres_value_to_json(row, idx)?);
    }
    Ok(record)
}

/// Typed getter that maps SQL NULL to `None`
fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        ParleyError::execution(format!(
            "Failed to read column '{}': {e}",
            row.columns()[idx].name()
        ))
    })
}

fn float(v: f64) -> Value {
    // NaN/Infinity as null
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// Convert `PostgreSQL` value to JSON value
fn postgres_value_to_json(row: &Row, idx: usize) -> Result<Value> {
    use base64::Engine;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    let col_type = row.columns()[idx].type_();

    let value = match *col_type {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| float(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(float),
        Type::JSON | Type::JSONB => get::<Value>(row, idx)?,
        Type::BYTEA => get::<Vec<u8>>(row, idx)?
            .map(|v| Value::String(base64::engine::general_purpose::STANDARD.encode(v))),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S").to_string())),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(|v| Value::String(v.to_rfc3339())),
        Type::DATE => get::<NaiveDate>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%d").to_string())),
        Type::TIME => get::<NaiveTime>(row, idx)?
            .map(|v| Value::String(v.format("%H:%M:%S").to_string())),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),
        // VARCHAR, TEXT, BPCHAR, NAME
        _ => get::<String>(row, idx)?.map(Value::String),
    };

    Ok(value.unwrap_or(Value::Null))
}
