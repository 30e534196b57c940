//! Persistence error types.
//!
//! Every failure the worker can hit maps to one [`PersistenceError`] variant.
//! The worker turns these into typed error responses, so each variant also
//! has a stable machine-readable [`ErrorKind`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persistence operation error.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backing store could not be opened or exclusively acquired.
    #[error("Storage unavailable: {path}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be serialized to JSON.
    #[error("Failed to serialize document")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },

    /// Truncating, writing or flushing the document failed.
    #[error("Failed to {operation} document: {path}")]
    WriteFailure {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the document failed.
    #[error("Failed to {operation} document: {path}")]
    ReadFailure {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request envelope was malformed or of an unknown type.
    #[error("Invalid request: {reason}")]
    Protocol { reason: String },

    /// Invalid store configuration.
    #[error("Invalid configuration: {reason}")]
    Config {
        path: Option<PathBuf>,
        reason: String,
    },

    /// The worker task is no longer running.
    #[error("Persistence worker has stopped")]
    WorkerClosed,
}

/// Machine-readable error category carried in error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StorageUnavailable,
    SerializationError,
    WriteFailure,
    ReadFailure,
    Protocol,
    Config,
    WorkerClosed,
}

impl ErrorKind {
    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StorageUnavailable => "storage_unavailable",
            Self::SerializationError => "serialization_error",
            Self::WriteFailure => "write_failure",
            Self::ReadFailure => "read_failure",
            Self::Protocol => "protocol",
            Self::Config => "config",
            Self::WorkerClosed => "worker_closed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PersistenceError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            Self::Serialization { .. } => ErrorKind::SerializationError,
            Self::WriteFailure { .. } => ErrorKind::WriteFailure,
            Self::ReadFailure { .. } => ErrorKind::ReadFailure,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Config { .. } => ErrorKind::Config,
            Self::WorkerClosed => ErrorKind::WorkerClosed,
        }
    }

    /// Get a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::StorageUnavailable { path, source } => {
                if source.kind() == std::io::ErrorKind::WouldBlock {
                    format!(
                        "The document at {} is already open in another worker.",
                        path.display()
                    )
                } else {
                    format!("Could not open the document store at {}.", path.display())
                }
            }
            Self::Serialization { .. } => {
                "The document could not be converted to JSON.".to_string()
            }
            Self::WriteFailure {
                operation, path, ..
            } => {
                format!("Could not {} the document at {}.", operation, path.display())
            }
            Self::ReadFailure {
                operation, path, ..
            } => {
                format!("Could not {} the document at {}.", operation, path.display())
            }
            Self::Protocol { reason } => format!("The request was rejected: {reason}."),
            Self::Config { path, reason } => match path {
                Some(path) => format!("The settings file {} is invalid: {reason}.", path.display()),
                None => format!("The store settings are invalid: {reason}."),
            },
            Self::WorkerClosed => "The persistence worker is no longer running.".to_string(),
        }
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::StorageUnavailable { source, .. } => {
                if source.kind() == std::io::ErrorKind::WouldBlock {
                    Some("Close the other process using this store, then retry.".into())
                } else {
                    Some("Check that the storage directory exists and is writable.".into())
                }
            }
            Self::Serialization { .. } => None,
            Self::WriteFailure { .. } => {
                Some("Check free disk space and write permissions for the store.".into())
            }
            Self::ReadFailure { .. } => {
                Some("Check that you have permission to read the store.".into())
            }
            Self::Protocol { .. } => {
                Some("Send a JSON object with \"type\" set to \"save\" or \"load\".".into())
            }
            Self::Config { .. } => Some("Fix or remove the settings file.".into()),
            Self::WorkerClosed => None,
        }
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
