//! Error types for the fleet governor
//!
//! Every variant is recoverable during a cycle: callers log it and continue.
//! Only store initialization failures are fatal, and only at start-up.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by governor components
#[derive(Debug, Error)]
pub enum FleetError {
    /// A snapshot document is missing or unreadable
    #[error("snapshot source {path} unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot document could not be parsed
    #[error("snapshot source {path} malformed: {source}")]
    MalformedSource {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An external runtime command exited unsuccessfully or could not be spawned
    #[error("runtime command `{command}` failed: {message}")]
    RuntimeCommand { command: String, message: String },

    /// An external command did not finish within the configured timeout
    #[error("command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// The metrics store's directory could not be created
    #[error("cannot prepare metrics store directory {path}: {source}")]
    StoreLocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metrics store rejected an operation
    #[error("metrics store error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FleetError {
    /// Shorthand for a failed runtime command
    pub fn runtime(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuntimeCommand {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, FleetError>;
