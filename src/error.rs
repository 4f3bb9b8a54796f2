//! Error handling for huntstore
//!
//! This module provides error types and result aliases for shard store operations.
//! Construction-time and write-time failures surface through these variants;
//! per-shard read failures are contained by the merge query executor and never
//! reach the caller as an `Error`.

use std::path::PathBuf;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::shard::ShardError;

/// Errors that can occur in huntstore operations
#[derive(Error, Debug)]
pub enum Error {
    /// The directory lock was not obtained within the configured bound
    #[error("Timed out after {waited:?} waiting for directory lock {path:?}")]
    LockTimeout {
        path: PathBuf,
        waited: Duration,
    },

    /// The lock file could not be created or locked
    #[error("Lock error for {path:?}: {message}")]
    Lock {
        path: PathBuf,
        message: String,
    },

    /// The current shard could not be opened or created
    #[error("Cannot open shard {path:?}: {message}")]
    Open {
        path: PathBuf,
        message: String,
    },

    /// Table, index or version creation failed
    #[error("Schema error: {0}")]
    Schema(String),

    /// The version sentinel is missing or does not match
    #[error("Validation failed for {path:?}: {message}")]
    Validation {
        path: PathBuf,
        message: String,
    },

    /// A shard file could not be renamed out of the way
    #[error("Cannot quarantine {path:?}: {message}")]
    Quarantine {
        path: PathBuf,
        message: String,
    },

    /// A read statement failed
    #[error("Query error: {0}")]
    Query(String),

    /// A write statement failed inside a batch
    #[error("Statement {index} failed ({statement}): {message}")]
    Exec {
        index: usize,
        statement: String,
        message: String,
    },

    /// Beginning or committing a transaction failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Errors related to shard naming and enumeration
    #[error("Shard error: {0}")]
    Shard(String),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for huntstore operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new lock timeout error
    pub fn lock_timeout(path: impl Into<PathBuf>, waited: Duration) -> Self {
        Self::LockTimeout {
            path: path.into(),
            waited,
        }
    }

    /// Create a new lock error
    pub fn lock(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Lock {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new open error
    pub fn open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create a new validation error
    pub fn validation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new quarantine error
    pub fn quarantine(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Quarantine {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Create a new statement execution error
    pub fn exec(index: usize, statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exec {
            index,
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Create a new transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Create a new shard error
    pub fn shard(message: impl Into<String>) -> Self {
        Self::Shard(message.into())
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is a lock timeout
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Check if this is an I/O error
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Check if the caller may simply re-invoke the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Get a developer-friendly description of the error
    pub fn dev_description(&self) -> String {
        match self {
            Self::LockTimeout { path, waited } => {
                format!("Lock timeout on {:?} after {}ms", path, waited.as_millis())
            }
            Self::Lock { path, message } => format!("Lock error for {:?}: {}", path, message),
            Self::Open { path, message } => format!("Open error for {:?}: {}", path, message),
            Self::Schema(msg) => format!("Schema error: {}", msg),
            Self::Validation { path, message } => {
                format!("Validation error for {:?}: {}", path, message)
            }
            Self::Quarantine { path, message } => {
                format!("Quarantine error for {:?}: {}", path, message)
            }
            Self::Query(msg) => format!("Query error: {}", msg),
            Self::Exec { index, statement, message } => {
                format!("Exec error at statement #{} `{}`: {}", index, statement, message)
            }
            Self::Transaction(msg) => format!("Transaction error: {}", msg),
            Self::Shard(msg) => format!("Shard error: {}", msg),
            Self::Config(msg) => format!("Configuration error: {}", msg),
            Self::Io(err) => format!("I/O error: {}", err),
        }
    }

    /// Get a user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::LockTimeout { .. } => {
                Some("Another process holds the shard directory; retry the operation".to_string())
            }
            Self::Open { .. } | Self::Lock { .. } => {
                Some("Check that the shard directory exists and is writable".to_string())
            }
            Self::Quarantine { .. } => Some(
                "Move the corrupt shard aside manually; its data is preserved for inspection"
                    .to_string(),
            ),
            Self::Exec { .. } => {
                Some("No statement of the batch was applied; fix the failing statement".to_string())
            }
            Self::Io(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                Some("You don't have permission to access this file or directory".to_string())
            }
            _ => None,
        }
    }
}

impl From<ShardError> for Error {
    fn from(err: ShardError) -> Self {
        match err {
            ShardError::Io(err) => Self::Io(err),
            ShardError::Quarantine { path, target, source } => {
                Self::quarantine(path, format!("rename to {:?} failed: {}", target, source))
            }
            other => Self::Shard(other.to_string()),
        }
    }
}
