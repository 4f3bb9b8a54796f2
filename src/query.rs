//! Merge query executor
//!
//! Runs one read statement against every shard file in the directory and
//! concatenates the rows. Each shard gets its own short-lived connection,
//! which never creates a missing file and rolls back a journal left by a
//! crashed writer. A shard that cannot be opened or fails the statement is
//! quarantined and left out of the result; the scan carries on with the rest.
//! Only failing to list the directory fails the whole query.
//!
//! Rows come back in shard file name order (chronological for `YYMM` ids),
//! then in each shard's native row order.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::{Record, SqlEngine};
use crate::error::Result;
use crate::shard::{util, ShardManager};

/// A shard that failed during a merge query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantineReport {
    /// Original path of the shard file
    pub path: PathBuf,
    /// Why the shard was rejected
    pub reason: String,
    /// Where the file was moved, or `None` if the rename failed
    pub quarantined_to: Option<PathBuf>,
}

/// Rows and diagnostics from a merge query
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Rows from every healthy shard, in shard order
    pub records: Vec<Record>,
    /// Number of shard files the statement ran against successfully
    pub shards_scanned: usize,
    /// Every shard that failed and was set aside
    pub quarantined: Vec<QuarantineReport>,
    /// Wall time of the scan
    pub duration: Duration,
}

impl MergeResult {
    /// Check if any shard failed during the scan
    pub fn is_degraded(&self) -> bool {
        !self.quarantined.is_empty()
    }

    /// Check if a given shard file was set aside by this scan
    pub fn quarantined_path(&self, path: &Path) -> bool {
        self.quarantined.iter().any(|r| r.path == path)
    }
}

/// A read statement to run across a shard directory
#[derive(Debug)]
pub struct MergeQuery<'a> {
    shards: &'a ShardManager,
    statement: &'a str,
    busy_timeout: Duration,
}

impl<'a> MergeQuery<'a> {
    /// Prepare `statement` for every shard managed by `shards`
    pub fn new(shards: &'a ShardManager, statement: &'a str, busy_timeout: Duration) -> Self {
        Self {
            shards,
            statement,
            busy_timeout,
        }
    }

    /// Execute the statement against every shard
    ///
    /// The caller must hold the directory lock.
    pub fn execute(&self) -> Result<MergeResult> {
        let start = Instant::now();
        let files = util::list_shard_files(self.shards.dir())?;

        let mut result = MergeResult::default();

        for (id, path) in files {
            match self.query_shard(&path) {
                Ok(mut records) => {
                    debug!(shard = %id, rows = records.len(), "scanned shard");
                    result.shards_scanned += 1;
                    result.records.append(&mut records);
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(shard = %id, path = %path.display(), error = %reason, "shard failed during search");

                    let quarantined_to = match self.shards.quarantine(&path) {
                        Ok(target) => Some(target),
                        Err(rename_err) => {
                            warn!(path = %path.display(), error = %rename_err, "could not quarantine shard, skipping it");
                            None
                        }
                    };

                    result.quarantined.push(QuarantineReport {
                        path,
                        reason,
                        quarantined_to,
                    });
                }
            }
        }

        result.duration = start.elapsed();
        Ok(result)
    }

    // The connection is closed when this returns, before any rename.
    fn query_shard(&self, path: &Path) -> Result<Vec<Record>> {
        let engine = SqlEngine::open_existing(path, self.busy_timeout)?;
        engine.query(self.statement)
    }
}
