//! Parley - Natural-Language Operations Console
//!
//! Parley lets an operator type natural-language requests against a
//! registered backend (a relational database, a Kubernetes cluster, or an
//! Azure subscription) and get back either an executable command or a direct
//! answer. Nothing runs without an explicit "yes" from the operator.
//!
//! # Core Principles
//! - Human confirmation before every execution (enforced by the type system)
//! - Vendor-native commands (real SQL, real kubectl, real az)
//! - The model sees a snapshot of the backend, never credentials
//! - Deterministic context rendering (every enumeration is sorted)
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`config`] - Connection registry and translator settings
//! - [`engine`] - Backend adapters and context snapshots
//! - [`validation`] - Post-translation command checks and identifier quoting
//! - [`translator`] - Model request/response contract and transport
//! - [`executor`] - Shell execution of confirmed commands
//! - [`format`] - Raw output to terminal tables
//! - [`session`] - Interactive session state machine and terminal UI

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod format;
pub mod session;
pub mod translator;
pub mod validation;

// Re-export commonly used types for convenience
pub use config::{BackendKind, Connection, ConnectionDetails, ConnectionStore};
pub use engine::{build_adapter, Adapter, Backend, BackendContext};
pub use error::{ParleyError, Result};
pub use executor::{ProcessRunner, SystemProcessRunner};
pub use session::{ConfirmedCommand, HistoryEntry, Session, Step};
pub use translator::{Mode, Translation, Translator};
