//! Configuration Management
//!
//! This module handles the connection registry: the named backends an operator
//! has registered, and the store value the session opens once at start.
//!
//! # Configuration Location
//! - Default: `~/.config/parley/connections.json` (per-user)
//! - Override: `--registry <path>` or `PARLEY_REGISTRY`
//!
//! # Named Connections
//! Connections are stored by name (e.g., "prod-db", "staging-aks", "dev").
//! Names are unique case-insensitively and looked up case-insensitively.
//!
//! The registry is read once and rewritten on mutation with no locking
//! (last write wins); a running session never re-reads it.

pub mod settings;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ParleyError, Result};

/// Backend kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Cloud provider account (Azure)
    Cloud,
    /// Relational database (`PostgreSQL`, `MySQL`, `SQLite`)
    Database,
    /// Kubernetes cluster
    Kubernetes,
}

impl BackendKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Database => "database",
            Self::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "database" | "db" => Ok(Self::Database),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            other => Err(ParleyError::config(format!(
                "Unknown backend kind '{other}' (expected cloud, database or kubernetes)"
            ))),
        }
    }
}

/// Database connection details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseDetails {
    /// Driver name (postgres, mysql, sqlite)
    pub driver: String,

    /// Driver-specific connection string (URL or file path)
    /// WARNING: May contain credentials, do not log
    pub connection_string: String,

    /// Environment variable holding the password (if not embedded in the string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl DatabaseDetails {
    /// Read the password from `password_env`, if one is configured
    pub fn resolve_password(&self) -> Result<Option<String>> {
        match &self.password_env {
            None => Ok(None),
            Some(env_var) => std::env::var(env_var).map(Some).map_err(|_| {
                ParleyError::config(format!("Environment variable {env_var} not found for password"))
            }),
        }
    }
}

/// Cloud account details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudDetails {
    /// Provider name (azure)
    pub provider: String,

    /// Subscription to scope listings to (provider default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

/// Kubernetes cluster details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KubernetesDetails {
    /// Selected kubeconfig context
    pub context: String,
}

/// Kind-specific connection payload
///
/// The kind tag is derived from the variant, so a record whose kind and
/// details disagree cannot exist in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDetails {
    Cloud(CloudDetails),
    Database(DatabaseDetails),
    Kubernetes(KubernetesDetails),
}

impl ConnectionDetails {
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Cloud(_) => BackendKind::Cloud,
            Self::Database(_) => BackendKind::Database,
            Self::Kubernetes(_) => BackendKind::Kubernetes,
        }
    }
}

/// A registered backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub details: ConnectionDetails,
}

impl Connection {
    pub fn new(name: impl Into<String>, details: ConnectionDetails) -> Self {
        Self { name: name.into(), details }
    }

    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.details.kind()
    }

    /// Subtype used by the adapter factory (driver, provider, or `kubectl`)
    #[must_use]
    pub fn subtype(&self) -> String {
        match &self.details {
            ConnectionDetails::Cloud(cloud) => cloud.provider.to_ascii_lowercase(),
            ConnectionDetails::Database(db) => db.driver.to_ascii_lowercase(),
            ConnectionDetails::Kubernetes(_) => "kubectl".to_string(),
        }
    }

    /// Short description without credentials
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.details {
            ConnectionDetails::Cloud(cloud) => match &cloud.subscription {
                Some(sub) => format!("cloud/{} (subscription {sub})", cloud.provider),
                None => format!("cloud/{}", cloud.provider),
            },
            ConnectionDetails::Database(db) => format!("database/{}", db.driver),
            ConnectionDetails::Kubernetes(k8s) => format!("kubernetes (context {})", k8s.context),
        }
    }

    fn to_stored(&self) -> Result<StoredConnection> {
        let details = match &self.details {
            ConnectionDetails::Cloud(d) => serde_json::to_value(d),
            ConnectionDetails::Database(d) => serde_json::to_value(d),
            ConnectionDetails::Kubernetes(d) => serde_json::to_value(d),
        }
        .map_err(|e| ParleyError::config(format!("Could not serialize connection details: {e}")))?;

        Ok(StoredConnection { name: self.name.clone(), kind: self.kind(), details })
    }
}

/// On-disk connection record
///
/// `details` is decoded according to `kind`; a payload that does not match
/// its kind is rejected rather than coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConnection {
    pub name: String,
    pub kind: BackendKind,
    pub details: serde_json::Value,
}

impl StoredConnection {
    /// Decode the kind-specific payload into a `Connection`
    pub fn resolve(&self) -> Result<Connection> {
        let mismatch = |e: serde_json::Error| {
            ParleyError::config(format!(
                "Connection '{}' has {} details that do not match its kind: {e}",
                self.name, self.kind
            ))
        };

        let details = match self.kind {
            BackendKind::Cloud => ConnectionDetails::Cloud(
                serde_json::from_value(self.details.clone()).map_err(mismatch)?,
            ),
            BackendKind::Database => ConnectionDetails::Database(
                serde_json::from_value(self.details.clone()).map_err(mismatch)?,
            ),
            BackendKind::Kubernetes => ConnectionDetails::Kubernetes(
                serde_json::from_value(self.details.clone()).map_err(mismatch)?,
            ),
        };

        Ok(Connection { name: self.name.clone(), details })
    }
}

/// Connection registry (stored in the config file)
///
/// Example:
/// ```json
/// {
///   "connections": [
///     { "name": "prod-db", "kind": "database",
///       "details": { "driver": "postgres", "connection_string": "postgres://app@db/prod" } },
///     { "name": "aks", "kind": "kubernetes", "details": { "context": "aks-westeurope" } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionRegistry {
    #[serde(default)]
    pub connections: Vec<StoredConnection>,
}

/// Get path to the default registry file (`~/.config/parley/connections.json`)
pub fn default_registry_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PARLEY_REGISTRY") {
        return Ok(PathBuf::from(path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ParleyError::config("Could not determine user config directory"))?;

    Ok(config_dir.join("parley").join("connections.json"))
}

/// Load connection registry from a config file
///
/// A missing file is an empty registry.
pub fn load_registry(path: &Path) -> Result<ConnectionRegistry> {
    if !path.exists() {
        return Ok(ConnectionRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ParleyError::config(format!("Could not read registry file: {e}")))?;

    serde_json::from_str::<ConnectionRegistry>(&contents)
        .map_err(|e| ParleyError::config(format!("Invalid registry file format: {e}")))
}

/// Save connection registry to a config file
pub fn save_registry(path: &Path, registry: &ConnectionRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ParleyError::config(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| ParleyError::config(format!("Could not serialize registry: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| ParleyError::config(format!("Could not write registry file: {e}")))?;

    Ok(())
}

/// Connection store opened once per process
///
/// Every record is decoded on open, so a kind/details mismatch anywhere in
/// the file surfaces immediately instead of at session start.
#[derive(Debug)]
pub struct ConnectionStore {
    path: PathBuf,
    connections: Vec<Connection>,
}

impl ConnectionStore {
    /// Open the registry at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let registry = load_registry(&path)?;

        let mut store = Self { path, connections: Vec::with_capacity(registry.connections.len()) };
        for stored in &registry.connections {
            store.insert(stored.resolve()?)?;
        }

        debug!(count = store.connections.len(), "Loaded connection registry");
        Ok(store)
    }

    /// Open the registry at the default location
    pub fn open_default() -> Result<Self> {
        Self::open(default_registry_path()?)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a connection by name (case-insensitive)
    pub fn get(&self, name: &str) -> Result<&Connection> {
        self.connections.iter().find(|c| same_name(&c.name, name)).ok_or_else(|| {
            let available: Vec<&str> = self.connections.iter().map(|c| c.name.as_str()).collect();
            ParleyError::config(format!(
                "Connection '{name}' not found. Available connections: {available:?}"
            ))
        })
    }

    /// All connections sorted by name
    #[must_use]
    pub fn list(&self) -> Vec<&Connection> {
        let mut all: Vec<&Connection> = self.connections.iter().collect();
        all.sort_by_key(|c| c.name.to_lowercase());
        all
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Register a new connection and persist the registry
    pub fn add(&mut self, connection: Connection) -> Result<()> {
        self.insert(connection)?;
        self.save()
    }

    /// Remove a connection by name (case-insensitive) and persist the registry
    pub fn remove(&mut self, name: &str) -> Result<Connection> {
        let idx = self
            .connections
            .iter()
            .position(|c| same_name(&c.name, name))
            .ok_or_else(|| ParleyError::config(format!("Connection '{name}' not found")))?;

        let removed = self.connections.remove(idx);
        self.save()?;
        Ok(removed)
    }

    /// Write the registry back to disk (last write wins)
    pub fn save(&self) -> Result<()> {
        let registry = ConnectionRegistry {
            connections: self
                .connections
                .iter()
                .map(Connection::to_stored)
                .collect::<Result<Vec<_>>>()?,
        };
        save_registry(&self.path, &registry)?;
        info!(path = %self.path.display(), "Saved connection registry");
        Ok(())
    }

    fn insert(&mut self, connection: Connection) -> Result<()> {
        if connection.name.trim().is_empty() {
            return Err(ParleyError::config("Connection name cannot be empty"));
        }

        if self.connections.iter().any(|c| same_name(&c.name, &connection.name)) {
            return Err(ParleyError::config(format!(
                "A connection named '{}' already exists",
                connection.name
            )));
        }

        self.connections.push(connection);
        Ok(())
    }
}

/// Connection names compare case-insensitively, Unicode included
fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
