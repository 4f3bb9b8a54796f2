//! Error types for the shard module
//!
//! Defines error types specific to shard file operations.

use std::path::PathBuf;
use std::io;
use thiserror::Error;

/// Errors that can occur during shard operations
#[derive(Error, Debug)]
pub enum ShardError {
    /// Error when shard ID is invalid
    #[error("Invalid shard ID: {0}")]
    InvalidId(String),

    /// The shard directory could not be listed
    #[error("Cannot enumerate shard directory {path:?}: {source}")]
    Enumeration {
        path: PathBuf,
        source: io::Error,
    },

    /// A shard file could not be renamed to its quarantine name
    #[error("Cannot quarantine {path:?} as {target:?}: {source}")]
    Quarantine {
        path: PathBuf,
        target: PathBuf,
        source: io::Error,
    },

    /// File error
    #[error("File error for {path:?}: {message}")]
    File {
        path: PathBuf,
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for shard operations
pub type ShardResult<T> = std::result::Result<T, ShardError>;

impl ShardError {
    /// Create a new file error
    pub fn file_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::File {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid shard ID error
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    /// Check if this is a quarantine failure
    pub fn is_quarantine_error(&self) -> bool {
        matches!(self, Self::Quarantine { .. })
    }

    /// Check if this is an I/O error
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
