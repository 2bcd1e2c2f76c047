//! Parley CLI Entry Point
//!
//! This is the main binary entry point for the Parley CLI.
//! It provides three subcommands:
//! - `session` - Interactive natural-language session against a connection
//! - `context` - Print what the translator will be told about a connection
//! - `connections` - Connection registry management
//!
//! The session owns the terminal, so logs always go to a daily file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{Confirm, Select};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley::config::settings::Settings;
use parley::config::{
    BackendKind, CloudDetails, Connection, ConnectionDetails, ConnectionStore, DatabaseDetails,
    KubernetesDetails,
};
use parley::engine::{build_adapter, Backend};
use parley::executor::SystemProcessRunner;
use parley::translator::AnthropicTranslator;

/// Parley - natural-language operations console
#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Ask databases, clusters and cloud accounts in plain language; nothing runs without your yes")]
#[command(version)]
struct Cli {
    /// Connection registry file (defaults to PARLEY_REGISTRY, then the user config directory)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session (pick a connection when NAME is omitted)
    #[command(alias = "run")]
    Session {
        name: Option<String>,
    },

    /// Check a connection and print the context the translator receives
    Context {
        name: String,
    },

    /// Manage registered connections
    #[command(subcommand)]
    Connections(ConnectionsCommand),
}

#[derive(Subcommand)]
enum ConnectionsCommand {
    /// List registered connections
    List,

    /// Register a new connection
    Add(AddArgs),

    /// Remove a connection
    Remove {
        name: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Args)]
struct AddArgs {
    /// Unique connection name (case-insensitive)
    name: String,

    /// Backend kind: database, kubernetes or cloud
    #[arg(long)]
    kind: BackendKind,

    /// Database driver: postgres, mysql, sqlite or mongodb
    #[arg(long)]
    driver: Option<String>,

    /// Database connection string (URL or file path)
    #[arg(long)]
    url: Option<String>,

    /// Environment variable holding the database password
    #[arg(long)]
    password_env: Option<String>,

    /// Cloud provider (azure)
    #[arg(long)]
    provider: Option<String>,

    /// Cloud subscription to scope every command to
    #[arg(long)]
    subscription: Option<String>,

    /// Kubeconfig context of the cluster
    #[arg(long)]
    context: Option<String>,
}

impl AddArgs {
    fn into_connection(self) -> Result<Connection> {
        let details = match self.kind {
            BackendKind::Database => ConnectionDetails::Database(DatabaseDetails {
                driver: self.driver.context("--driver is required for database connections")?,
                connection_string: self.url.context("--url is required for database connections")?,
                password_env: self.password_env,
            }),
            BackendKind::Cloud => ConnectionDetails::Cloud(CloudDetails {
                provider: self.provider.unwrap_or_else(|| "azure".to_string()),
                subscription: self.subscription,
            }),
            BackendKind::Kubernetes => ConnectionDetails::Kubernetes(KubernetesDetails {
                context: self.context.context("--context is required for kubernetes connections")?,
            }),
        };
        Ok(Connection::new(self.name, details))
    }
}

/// Install the file subscriber; the guard flushes on drop
fn init_logging() -> Result<WorkerGuard> {
    let log_dir = dirs::data_local_dir()
        .context("Could not determine user data directory")?
        .join("parley")
        .join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "parley.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("PARLEY_LOG")
                .unwrap_or_else(|_| "parley=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

fn open_store(registry: Option<PathBuf>) -> Result<ConnectionStore> {
    let store = match registry {
        Some(path) => ConnectionStore::open(path),
        None => ConnectionStore::open_default(),
    };
    store.context("Failed to open connection registry")
}

/// Resolve the connection named on the command line or ask for one
fn choose_connection(store: &ConnectionStore, name: Option<String>) -> Result<Connection> {
    if let Some(name) = name {
        return Ok(store.get(&name)?.clone());
    }

    let connections = store.list();
    if connections.is_empty() {
        bail!("No connections registered. Add one with `parley connections add`.");
    }

    let items: Vec<String> =
        connections.iter().map(|c| format!("{}  {}", c.name, c.describe())).collect();
    let picked = Select::new()
        .with_prompt("Connection")
        .items(&items)
        .default(0)
        .interact_opt()
        .context("Failed to read selection")?;

    match picked {
        Some(idx) => Ok(connections[idx].clone()),
        None => bail!("No connection selected"),
    }
}

fn adapter_for(connection: &Connection) -> Result<Arc<dyn Backend>> {
    let settings = Settings::load().context("Failed to load translator settings")?;
    let adapter = build_adapter(
        connection,
        Arc::new(AnthropicTranslator::new(settings)),
        Arc::new(SystemProcessRunner),
    )?;
    Ok(Arc::new(adapter))
}

async fn show_context(connection: &Connection) -> Result<()> {
    let backend = adapter_for(connection)?;
    backend
        .check_authentication()
        .await
        .with_context(|| format!("Cannot reach '{}'", connection.name))?;
    backend.build_context().await?;
    println!("{}", backend.render_context().await);
    Ok(())
}

fn manage_connections(store: &mut ConnectionStore, command: ConnectionsCommand) -> Result<()> {
    match command {
        ConnectionsCommand::List => {
            if store.is_empty() {
                println!("No connections registered ({}).", store.path().display());
            }
            for connection in store.list() {
                println!("{:<24} {}", connection.name, connection.describe());
            }
        }
        ConnectionsCommand::Add(args) => {
            let connection = args.into_connection()?;
            let summary = format!("{} ({})", connection.name, connection.describe());
            store.add(connection)?;
            println!("Added {summary}");
        }
        ConnectionsCommand::Remove { name, yes } => {
            let connection = store.get(&name)?;
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("Remove connection '{}'?", connection.name))
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
            if !confirmed {
                println!("Nothing removed.");
                return Ok(());
            }
            let removed = store.remove(&name)?;
            println!("Removed {}", removed.name);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;
    info!("Starting parley v{}", env!("CARGO_PKG_VERSION"));

    let mut store = open_store(cli.registry)?;

    match cli.command {
        Commands::Session { name } => {
            let connection = choose_connection(&store, name)?;
            let backend = adapter_for(&connection)?;
            let title = format!("{} ({})", connection.name, connection.describe());
            parley::session::run(backend, title).await
        }
        Commands::Context { name } => show_context(store.get(&name)?).await,
        Commands::Connections(command) => manage_connections(&mut store, command),
    }
}
