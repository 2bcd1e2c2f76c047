//! Backend Adapters
//!
//! This module defines the uniform capability set every backend exposes to a
//! session: authentication check, context snapshot, translation, execution
//! and result formatting. Each backend (`PostgreSQL`, `MySQL`, `SQLite`,
//! `MongoDB`, Kubernetes, Azure) is a variant of the closed [`Driver`] enum; the shared
//! behaviour (context caching, translation plumbing) lives once in
//! [`Adapter`].
//!
//! # Engine Isolation
//! Each driver implementation is completely independent.
//! No shared SQL helpers or cross-engine abstractions beyond identifier quoting.
//!
//! # Construction
//! [`build_adapter`] is the only way to obtain an adapter. It matches
//! exhaustively on the connection's kind and subtype and returns a
//! `ConfigError` for pairs it does not know or drivers compiled out of the
//! binary.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{BackendKind, Connection, ConnectionDetails, DatabaseDetails};
use crate::error::{ParleyError, Result};
use crate::executor::ProcessRunner;
use crate::session::ConfirmedCommand;
use crate::translator::{self, Translation, TranslationRequest, Translator};

pub mod context;

pub mod azure;
pub mod kubernetes;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "mongo")]
pub mod mongo;

pub use context::BackendContext;

/// Capability set a session drives
///
/// Every method maps its failure to the error kind the session expects:
/// `Auth` from `check_authentication`, `Context` from `build_context`,
/// `Translation` from the translate methods, `Execution` from `execute`,
/// `Format` from `format_as_table`.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// What a command is called for this backend ("SQL query", ...)
    fn command_label(&self) -> &'static str;

    /// Cheap, side-effect free reachability and credential check
    async fn check_authentication(&self) -> Result<()>;

    /// Enumerate the backend and store the snapshot
    async fn build_context(&self) -> Result<()>;

    /// Context text for the translator; never fails
    async fn render_context(&self) -> String;

    /// Rendered snapshot if one has been built; never starts a build
    async fn built_context(&self) -> Option<String>;

    async fn translate_to_command(&self, prompt: &str) -> Result<Translation>;

    async fn translate_to_answer(&self, prompt: &str) -> Result<String>;

    /// Run a command the operator has confirmed
    async fn execute(&self, command: &ConfirmedCommand) -> Result<Vec<u8>>;

    fn format_as_table(&self, raw: &[u8]) -> Result<String>;
}

/// Closed set of backend drivers
pub enum Driver {
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresDriver),
    #[cfg(feature = "mysql")]
    MySql(mysql::MySqlDriver),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteDriver),
    #[cfg(feature = "mongo")]
    Mongo(mongo::MongoDriver),
    Kubernetes(kubernetes::KubectlDriver),
    Azure(azure::AzureDriver),
}

impl Driver {
    const fn kind(&self) -> BackendKind {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => BackendKind::Database,
            #[cfg(feature = "mysql")]
            Self::MySql(_) => BackendKind::Database,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => BackendKind::Database,
            #[cfg(feature = "mongo")]
            Self::Mongo(_) => BackendKind::Database,
            Self::Kubernetes(_) => BackendKind::Kubernetes,
            Self::Azure(_) => BackendKind::Cloud,
        }
    }

    const fn command_label(&self) -> &'static str {
        match self {
            Self::Kubernetes(_) => "kubectl command",
            Self::Azure(_) => "Azure CLI command",
            #[cfg(feature = "mongo")]
            Self::Mongo(_) => "MongoDB command",
            #[allow(unreachable_patterns)]
            _ => "SQL query",
        }
    }

    async fn check_authentication(&self) -> Result<()> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(d) => d.check_authentication().await,
            #[cfg(feature = "mysql")]
            Self::MySql(d) => d.check_authentication().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(d) => d.check_authentication().await,
            #[cfg(feature = "mongo")]
            Self::Mongo(d) => d.check_authentication().await,
            Self::Kubernetes(d) => d.check_authentication().await,
            Self::Azure(d) => d.check_authentication().await,
        }
    }

    async fn build_context(&self) -> Result<BackendContext> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(d) => d.build_context().await,
            #[cfg(feature = "mysql")]
            Self::MySql(d) => d.build_context().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(d) => d.build_context().await,
            #[cfg(feature = "mongo")]
            Self::Mongo(d) => d.build_context().await,
            Self::Kubernetes(d) => d.build_context().await,
            Self::Azure(d) => d.build_context().await,
        }
    }

    fn validate(&self, command: &str) -> Result<String> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => {
                crate::validation::validate_sql(command, context::QuoteStyle::DoubleQuote)
            }
            #[cfg(feature = "mysql")]
            Self::MySql(_) => crate::validation::validate_sql(command, context::QuoteStyle::Backtick),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => {
                crate::validation::validate_sql(command, context::QuoteStyle::DoubleQuote)
            }
            #[cfg(feature = "mongo")]
            Self::Mongo(_) => crate::validation::validate_mongo(command),
            Self::Kubernetes(d) => crate::validation::validate_kubectl_in(command, d.context()),
            Self::Azure(_) => crate::validation::validate_cloud(command),
        }
    }

    async fn execute(&self, command: &str) -> Result<Vec<u8>> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(d) => d.execute(command).await,
            #[cfg(feature = "mysql")]
            Self::MySql(d) => d.execute(command).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(d) => d.execute(command).await,
            #[cfg(feature = "mongo")]
            Self::Mongo(d) => d.execute(command).await,
            Self::Kubernetes(d) => d.execute(command).await,
            Self::Azure(d) => d.execute(command).await,
        }
    }

    fn format_as_table(&self, raw: &[u8]) -> Result<String> {
        match self {
            Self::Kubernetes(_) | Self::Azure(_) => crate::format::auto(raw),
            // database drivers always emit a JSON array of records
            #[allow(unreachable_patterns)]
            _ => crate::format::json_table(raw),
        }
    }
}

/// A driver plus the per-session state every backend shares
pub struct Adapter {
    name: String,
    driver: Driver,
    translator: Arc<dyn Translator>,
    context: RwLock<Option<BackendContext>>,
}

impl Adapter {
    pub fn new(name: impl Into<String>, driver: Driver, translator: Arc<dyn Translator>) -> Self {
        Self { name: name.into(), driver, translator, context: RwLock::new(None) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot taken by the last successful build, if any
    pub async fn context(&self) -> Option<BackendContext> {
        self.context.read().await.clone()
    }

    async fn request(&self, prompt: &str) -> TranslationRequest {
        TranslationRequest {
            prompt: prompt.to_string(),
            command_label: self.command_label().to_string(),
            context: self.render_context().await,
        }
    }
}

#[async_trait]
impl Backend for Adapter {
    fn kind(&self) -> BackendKind {
        self.driver.kind()
    }

    fn command_label(&self) -> &'static str {
        self.driver.command_label()
    }

    async fn check_authentication(&self) -> Result<()> {
        info!(connection = %self.name, "Checking authentication");
        self.driver.check_authentication().await
    }

    async fn build_context(&self) -> Result<()> {
        info!(connection = %self.name, "Building backend context");
        let snapshot = self.driver.build_context().await?;
        *self.context.write().await = Some(snapshot);
        Ok(())
    }

    async fn render_context(&self) -> String {
        if let Some(snapshot) = self.context.read().await.as_ref() {
            return snapshot.render();
        }

        match self.build_context().await {
            Ok(()) => self
                .context
                .read()
                .await
                .as_ref()
                .map(BackendContext::render)
                .unwrap_or_default(),
            Err(e) => {
                warn!(connection = %self.name, error = %e, "Backend context unavailable");
                unavailable_context(&e)
            }
        }
    }

    async fn built_context(&self) -> Option<String> {
        self.context.read().await.as_ref().map(BackendContext::render)
    }

    async fn translate_to_command(&self, prompt: &str) -> Result<Translation> {
        let request = self.request(prompt).await;
        translator::translate_command(self.translator.as_ref(), &request, |c| {
            self.driver.validate(c)
        })
        .await
    }

    async fn translate_to_answer(&self, prompt: &str) -> Result<String> {
        let request = self.request(prompt).await;
        translator::translate_answer(self.translator.as_ref(), &request).await
    }

    async fn execute(&self, command: &ConfirmedCommand) -> Result<Vec<u8>> {
        info!(connection = %self.name, "Executing confirmed command");
        self.driver.execute(command.as_str()).await
    }

    fn format_as_table(&self, raw: &[u8]) -> Result<String> {
        self.driver.format_as_table(raw)
    }
}

/// Context text used in place of a snapshot that could not be built
#[must_use]
pub fn unavailable_context(error: &ParleyError) -> String {
    format!("Backend context is unavailable ({error}). Work from the request alone.")
}

/// Build the adapter for a registered connection
///
/// Unknown kind/subtype pairs and drivers compiled out of this binary are
/// configuration errors.
pub fn build_adapter(
    connection: &Connection,
    translator: Arc<dyn Translator>,
    runner: Arc<dyn ProcessRunner>,
) -> Result<Adapter> {
    let driver = match &connection.details {
        ConnectionDetails::Database(details) => database_driver(details)?,
        ConnectionDetails::Kubernetes(details) => {
            Driver::Kubernetes(kubernetes::KubectlDriver::new(details.context.clone(), runner))
        }
        ConnectionDetails::Cloud(details) => match details.provider.to_ascii_lowercase().as_str() {
            "azure" => Driver::Azure(azure::AzureDriver::new(details.subscription.clone(), runner)),
            other => return Err(unsupported(BackendKind::Cloud, other)),
        },
    };

    info!(connection = %connection.name, backend = %connection.describe(), "Adapter ready");
    Ok(Adapter::new(connection.name.clone(), driver, translator))
}

fn database_driver(details: &DatabaseDetails) -> Result<Driver> {
    match details.driver.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => {
            #[cfg(feature = "postgres")]
            {
                Ok(Driver::Postgres(postgres::PostgresDriver::new(details)?))
            }
            #[cfg(not(feature = "postgres"))]
            {
                Err(compiled_out("postgres"))
            }
        }
        "mysql" | "mariadb" => {
            #[cfg(feature = "mysql")]
            {
                Ok(Driver::MySql(mysql::MySqlDriver::new(details)?))
            }
            #[cfg(not(feature = "mysql"))]
            {
                Err(compiled_out("mysql"))
            }
        }
        "sqlite" | "sqlite3" => {
            #[cfg(feature = "sqlite")]
            {
                Ok(Driver::Sqlite(sqlite::SqliteDriver::new(details)?))
            }
            #[cfg(not(feature = "sqlite"))]
            {
                Err(compiled_out("sqlite"))
            }
        }
        "mongo" | "mongodb" => {
            #[cfg(feature = "mongo")]
            {
                Ok(Driver::Mongo(mongo::MongoDriver::new(details)?))
            }
            #[cfg(not(feature = "mongo"))]
            {
                Err(compiled_out("mongo"))
            }
        }
        other => Err(unsupported(BackendKind::Database, other)),
    }
}

fn unsupported(kind: BackendKind, subtype: &str) -> ParleyError {
    ParleyError::config(format!("Unsupported backend: {kind}/{subtype}"))
}

#[allow(dead_code)]
fn compiled_out(driver: &str) -> ParleyError {
    ParleyError::config(format!(
        "This binary was built without {driver} support (enable the `{driver}` feature)"
    ))
}
