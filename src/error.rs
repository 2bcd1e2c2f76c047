//! Error Handling Infrastructure
//!
//! This module defines the error taxonomy shared by every backend adapter and
//! the session engine. Each variant maps to a stable error code and to a
//! recoverability class the session uses to pick its next state.
//!
//! # Error Categories
//! - `Auth`: the backend rejected the operator or is unreachable (fatal at session start)
//! - `Context`: enumeration failed partially or fully (degraded, session continues)
//! - `Translation`: the model response was missing, unparsable, or failed validation
//! - `Execution`: the confirmed command failed when run
//! - `Format`: raw output could not be turned into a table
//! - `Config`: registry lookups, duplicate names, unsupported backend pairs

use thiserror::Error;

/// Main error type for Parley operations
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Authentication or authorization against the backend failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Backend context could not be enumerated
    #[error("Context unavailable: {0}")]
    Context(String),

    /// Language model response missing, unparsable, or rejected
    #[error("Translation failed: {0}")]
    Translation(String),

    /// Confirmed command failed when run
    ///
    /// The message carries the captured output verbatim.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Raw output could not be formatted
    #[error("Formatting failed: {0}")]
    Format(String),

    /// Connection registry or adapter construction error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ParleyError {
    /// Stable error code, suitable for logs and scripted callers
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "AUTH_FAILED",
            Self::Context(_) => "CONTEXT_UNAVAILABLE",
            Self::Translation(_) => "TRANSLATION_FAILED",
            Self::Execution(_) => "EXECUTION_FAILED",
            Self::Format(_) => "FORMAT_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether a session can continue after this error
    ///
    /// Authentication and configuration errors end the session; everything
    /// else returns the operator to prompt entry.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Auth(_) | Self::Config(_))
    }

    /// Human-readable message (no credentials)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn context(message: impl Into<String>) -> Self {
        Self::Context(message.into())
    }

    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ParleyError::auth("test").error_code(), "AUTH_FAILED");
        assert_eq!(ParleyError::context("test").error_code(), "CONTEXT_UNAVAILABLE");
        assert_eq!(ParleyError::translation("test").error_code(), "TRANSLATION_FAILED");
        assert_eq!(ParleyError::execution("test").error_code(), "EXECUTION_FAILED");
        assert_eq!(ParleyError::format("test").error_code(), "FORMAT_FAILED");
        assert_eq!(ParleyError::config("test").error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_recoverability() {
        assert!(!ParleyError::auth("expired token").is_recoverable());
        assert!(!ParleyError::config("unknown connection").is_recoverable());
        assert!(ParleyError::context("catalog").is_recoverable());
        assert!(ParleyError::translation("no command").is_recoverable());
        assert!(ParleyError::execution("exit 1").is_recoverable());
        assert!(ParleyError::format("bad json").is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = ParleyError::translation("command must start with kubectl");
        assert!(err.message().contains("Translation failed"));
        assert!(err.message().contains("kubectl"));

        let err = ParleyError::execution("Error from server (NotFound)");
        assert_eq!(err.message(), "Execution failed: Error from server (NotFound)");
    }
}
