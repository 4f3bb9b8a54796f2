//! Configuration for huntstore
//!
//! This module provides configuration options for a shard directory handle.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::error::{Result, Error};

/// Default bound on waiting for the directory lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default file name of the directory lock
pub const DEFAULT_LOCK_NAME: &str = "huntstore.lock";

/// Configuration options for a [`Database`](crate::Database)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct DatabaseConfig {
    // Locking
    /// How long `search`, `update` and construction wait for the directory lock
    pub lock_timeout: Duration,
    /// Sleep between attempts while the lock is contended
    pub lock_poll_interval: Duration,
    /// File name of the lock file
    pub lock_name: String,
    /// Directory holding the lock file (default: the shard directory)
    pub lock_dir: Option<PathBuf>,
    /// Hold the directory lock while validating or recreating the current shard
    pub lock_during_open: bool,

    // Storage
    /// SQLite busy timeout for every shard connection
    pub busy_timeout: Duration,
    /// Create the shard directory if it doesn't exist
    pub create_directory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            // Locking
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_poll_interval: Duration::from_millis(10),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            lock_dir: None,
            lock_during_open: true,

            // Storage
            busy_timeout: Duration::from_secs(5),
            create_directory: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock timeout
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the lock poll interval
    pub fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    /// Set the lock file name
    pub fn with_lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = name.into();
        self
    }

    /// Place the lock file in a different directory
    ///
    /// Handles on several shard directories that share a lock directory and
    /// lock name are serialized against each other.
    pub fn with_lock_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.lock_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set whether construction holds the directory lock
    pub fn with_lock_during_open(mut self, lock: bool) -> Self {
        self.lock_during_open = lock;
        self
    }

    /// Set the SQLite busy timeout
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set whether a missing shard directory is created
    pub fn with_create_directory(mut self, create: bool) -> Self {
        self.create_directory = create;
        self
    }

    /// Resolve the lock file path for a shard directory
    pub fn lock_path(&self, shard_dir: &Path) -> PathBuf {
        self.lock_dir
            .as_deref()
            .unwrap_or(shard_dir)
            .join(&self.lock_name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout.is_zero() {
            return Err(Error::config("Lock timeout must be greater than zero"));
        }

        if self.lock_poll_interval.is_zero() {
            return Err(Error::config("Lock poll interval must be greater than zero"));
        }

        if self.lock_poll_interval > self.lock_timeout {
            return Err(Error::config(
                "Lock poll interval must not exceed the lock timeout"
            ));
        }

        if self.lock_name.trim().is_empty() {
            return Err(Error::config("Lock name must not be empty"));
        }

        if self.lock_name.contains(|c: char| c == '/' || c == '\\') || self.lock_name == "." || self.lock_name == ".." {
            return Err(Error::config(format!(
                "Lock name must be a plain file name: {:?}", self.lock_name
            )));
        }

        Ok(())
    }

    /// Create a human-readable string representation of the configuration
    pub fn to_string_pretty(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Huntstore Configuration ===\n\n");

        result.push_str("Locking:\n");
        result.push_str(&format!("  Lock Timeout: {} ms\n", self.lock_timeout.as_millis()));
        result.push_str(&format!("  Lock Poll Interval: {} ms\n", self.lock_poll_interval.as_millis()));
        result.push_str(&format!("  Lock Name: {}\n", self.lock_name));
        match self.lock_dir {
            Some(ref dir) => result.push_str(&format!("  Lock Directory: {:?}\n", dir)),
            None => result.push_str("  Lock Directory: <shard directory>\n"),
        }
        result.push_str(&format!("  Lock During Open: {}\n", self.lock_during_open));

        result.push_str("\nStorage:\n");
        result.push_str(&format!("  Busy Timeout: {} ms\n", self.busy_timeout.as_millis()));
        result.push_str(&format!("  Create Directory: {}\n", self.create_directory));

        result
    }

    /// Parse configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Failed to parse JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize to JSON: {}", e)))
    }
}
