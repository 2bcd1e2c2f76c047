//! MongoDB Driver Implementation
//!
//! # Features
//! - `ping` database command as the authentication check
//! - Collections with field names and BSON types sampled from a few documents
//! - Commands are JSON database command documents run with `runCommand`
//!
//! # Implementation Notes
//! - The connection string must name the database (`mongodb://host/<db>`)
//! - A client is built per call; nothing is pooled across a session
//! - `find` and `aggregate` return their first batch only
//! - ObjectId and DateTime values become hex and RFC 3339 text

use std::collections::BTreeMap;
use std::time::Duration;

use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::DatabaseDetails;
use crate::engine::context::{BackendContext, Inventory, InventorySection};
use crate::error::{ParleyError, Result};

/// Documents read per collection to discover fields
const SAMPLE_SIZE: i64 = 20;

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Reply fields that describe the server rather than the result
const REPLY_METADATA: &[&str] = &["ok", "$clusterTime", "operationTime", "electionId", "opTime"];

pub struct MongoDriver {
    connection_string: String,
    database: String,
    password: Option<String>,
}

impl MongoDriver {
    /// Check the connection string and resolve the password
    pub fn new(details: &DatabaseDetails) -> Result<Self> {
        let url = details.connection_string.trim();
        if !url.starts_with("mongodb://") && !url.starts_with("mongodb+srv://") {
            return Err(ParleyError::config(
                "MongoDB connection strings start with mongodb:// or mongodb+srv://",
            ));
        }

        let database = database_name(url).ok_or_else(|| {
            ParleyError::config(
                "The MongoDB connection string must name a database (mongodb://host/<database>)",
            )
        })?;

        Ok(Self {
            connection_string: url.to_string(),
            database: database.to_string(),
            password: details.resolve_password()?,
        })
    }

    async fn open(&self) -> Result<Database> {
        let mut options = ClientOptions::parse(self.connection_string.as_str())
            .await
            .map_err(|e| ParleyError::config(format!("Invalid MongoDB connection string: {e}")))?;
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        options.app_name = Some("parley".to_string());

        if let Some(password) = &self.password {
            match options.credential.as_mut() {
                Some(credential) => credential.password = Some(password.clone()),
                None => {
                    return Err(ParleyError::config(
                        "A password is configured but the MongoDB connection string names no user",
                    ))
                }
            }
        }

        let client = Client::with_options(options)
            .map_err(|e| ParleyError::config(format!("Failed to create MongoDB client: {e}")))?;
        Ok(client.database(&self.database))
    }

    pub async fn check_authentication(&self) -> Result<()> {
        let db = self.open().await?;
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ParleyError::auth(format!("MongoDB ping failed: {e}")))?;
        Ok(())
    }

    pub async fn build_context(&self) -> Result<BackendContext> {
        let db = self.open().await.map_err(|e| ParleyError::context(e.message()))?;

        let mut names = db
            .list_collection_names()
            .await
            .map_err(|e| ParleyError::context(format!("Failed to list MongoDB collections: {e}")))?;
        names.retain(|name| !name.starts_with("system."));
        names.sort();

        let mut inventory = Inventory::new(format!(
            "MongoDB database {} (fields sampled from up to {SAMPLE_SIZE} documents per collection)",
            self.database
        ));
        for name in names {
            let fields = sample_fields(&db, &name).await;
            if let Err(reason) = &fields {
                warn!(collection = %name, %reason, "Sampling MongoDB collection failed");
            }
            inventory = inventory.section(InventorySection::new(name, fields));
        }

        if inventory.all_failed() {
            return Err(ParleyError::context(format!(
                "No collection of '{}' could be sampled",
                self.database
            )));
        }

        let inventory = inventory.note(
            r#"a command is one JSON command document for runCommand, e.g. {"find": "users", "filter": {"age": {"$gt": 30}}, "limit": 10}"#,
        );
        Ok(BackendContext::Collections(inventory))
    }

    /// Run a validated command document; the reply becomes a JSON array of records
    pub async fn execute(&self, command: &str) -> Result<Vec<u8>> {
        let document = command_document(command)?;
        let db = self.open().await.map_err(|e| ParleyError::execution(e.message()))?;

        debug!(database = %self.database, "Running MongoDB command");
        let reply = db
            .run_command(document)
            .await
            .map_err(|e| ParleyError::execution(e.to_string()))?;

        let records = reply_records(reply)?;
        serde_json::to_vec(&Value::Array(records))
            .map_err(|e| ParleyError::execution(format!("Failed to encode MongoDB reply: {e}")))
    }
}

/// Database named in the connection string path
fn database_name(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let rest = rest.split(['?', '#']).next()?;
    let (_, path) = rest.split_once('/')?;
    (!path.is_empty()).then_some(path)
}

/// Parse a command (JSON, extended JSON allowed) into a BSON document
fn command_document(command: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(command)
        .map_err(|e| ParleyError::execution(format!("Invalid command document: {e}")))?;

    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(_) => Err(ParleyError::execution("A MongoDB command must be a JSON object")),
        Err(e) => Err(ParleyError::execution(format!("Invalid command document: {e}"))),
    }
}

async fn sample_fields(db: &Database, collection: &str) -> std::result::Result<Vec<String>, String> {
    let mut cursor = db
        .collection::<Document>(collection)
        .find(doc! {})
        .limit(SAMPLE_SIZE)
        .await
        .map_err(|e| e.to_string())?;

    let mut fields: BTreeMap<String, &'static str> = BTreeMap::new();
    while cursor.advance().await.map_err(|e| e.to_string())? {
        let document: Document = cursor.deserialize_current().map_err(|e| e.to_string())?;
        for (key, value) in &document {
            fields.entry(key.clone()).or_insert_with(|| type_name(value));
        }
    }

    Ok(fields.into_iter().map(|(name, kind)| format!("{name} ({kind})")).collect())
}

/// BSON type alias as the MongoDB documentation spells it
fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        _ => "other",
    }
}

/// Records from a command reply
///
/// Cursor replies yield their first batch, `distinct` one record per value,
/// anything else (counts, write results) a single record.
fn reply_records(mut reply: Document) -> Result<Vec<Value>> {
    if let Some(errors) = reply.get("writeErrors") {
        return Err(ParleyError::execution(format!(
            "MongoDB reported write errors: {}",
            bson_to_json(errors.clone())
        )));
    }

    if let Ok(cursor) = reply.get_document_mut("cursor") {
        if let Some(Bson::Array(batch)) = cursor.remove("firstBatch") {
            return Ok(batch.into_iter().map(bson_to_json).collect());
        }
    }

    if let Some(Bson::Array(values)) = reply.remove("values") {
        return Ok(values.into_iter().map(|v| json!({ "value": bson_to_json(v) })).collect());
    }

    for key in REPLY_METADATA {
        reply.remove(*key);
    }
    Ok(vec![bson_to_json(Bson::Document(reply))])
}

fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(text) => Value::String(text),
            Err(_) => json!(dt.timestamp_millis()),
        },
        Bson::Document(document) => {
            Value::Object(document.into_iter().map(|(k, v)| (k, bson_to_json(v))).collect())
        }
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}
