//! Shard lifecycle manager
//!
//! Brings the current month's shard to an open, schema-complete state:
//!
//! - `Absent -> Initialized`: create the file and run the schema initializer
//! - `PresentValid -> Initialized`: open it, the version sentinel checks out
//! - `PresentInvalid -> Quarantined -> Initialized`: rename the file aside,
//!   then create a fresh shard in its place
//!
//! The caller is expected to hold the directory lock.

#[cfg(test)]
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::SqlEngine;
use crate::error::{Error, Result};
use crate::metrics::DatabaseMetrics;
use crate::schema;
#[cfg(test)]
use crate::shard::ShardError;
use crate::shard::{util, CurrentShard, OpenOutcome, ShardInfo, ShardMonth, ShardResult};

/// Opens, validates and recreates shards in one directory
#[derive(Debug, Clone)]
pub struct ShardManager {
    dir: PathBuf,
    busy_timeout: Duration,
    metrics: Option<Arc<DatabaseMetrics>>,
    #[cfg(test)]
    deny_quarantine: bool,
}

impl ShardManager {
    /// Create a manager for a shard directory
    pub fn new(dir: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            busy_timeout,
            metrics: None,
            #[cfg(test)]
            deny_quarantine: false,
        }
    }

    /// Make every quarantine rename fail, as on a read-only directory
    #[cfg(test)]
    pub(crate) fn deny_quarantine(mut self) -> Self {
        self.deny_quarantine = true;
        self
    }

    /// Count quarantines in the given metrics
    pub fn with_metrics(mut self, metrics: Arc<DatabaseMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The shard directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the shard file for a month
    pub fn shard_path(&self, month: ShardMonth) -> PathBuf {
        util::shard_path(&self.dir, &month.shard_id())
    }

    /// Create the shard directory if it doesn't exist
    pub fn ensure_dir(&self) -> Result<()> {
        util::ensure_shard_dir(&self.dir)?;
        Ok(())
    }

    /// Open the shard for `month`, leaving it valid and ready for writes
    ///
    /// A quarantine rename failure is fatal here: without it there is no
    /// path to a valid current shard.
    pub fn open_current(&self, month: ShardMonth) -> Result<(SqlEngine, CurrentShard)> {
        let id = month.shard_id();
        let path = self.shard_path(month);

        let (engine, outcome) = if path.exists() {
            match self.open_existing(&path) {
                Ok(engine) => {
                    debug!(shard = %id, "opened existing shard");
                    (engine, OpenOutcome::Opened)
                }
                Err(e) => {
                    warn!(shard = %id, path = %path.display(), error = %e, "current shard is invalid, quarantining");
                    let quarantined_to = self.quarantine(&path)?;
                    let engine = self.create(&path)?;
                    info!(shard = %id, quarantined_to = %quarantined_to.display(), "recreated current shard");
                    (engine, OpenOutcome::Recreated { quarantined_to })
                }
            }
        } else {
            let engine = self.create(&path)?;
            info!(shard = %id, path = %path.display(), "created new shard");
            (engine, OpenOutcome::Created)
        };

        Ok((
            engine,
            CurrentShard {
                id,
                month,
                path,
                outcome,
            },
        ))
    }

    /// Rename a shard file aside, returning where it went
    pub fn quarantine(&self, path: &Path) -> Result<PathBuf> {
        match self.rename_aside(path) {
            Ok(target) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_quarantine();
                }
                warn!(path = %path.display(), target = %target.display(), "quarantined shard");
                Ok(target)
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_quarantine_failure();
                }
                Err(e.into())
            }
        }
    }

    #[cfg(not(test))]
    fn rename_aside(&self, path: &Path) -> ShardResult<PathBuf> {
        util::quarantine_shard_file(path)
    }

    #[cfg(test)]
    fn rename_aside(&self, path: &Path) -> ShardResult<PathBuf> {
        if self.deny_quarantine {
            return Err(ShardError::Quarantine {
                path: path.to_path_buf(),
                target: util::quarantine_path(path),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "rename denied"),
            });
        }
        util::quarantine_shard_file(path)
    }

    /// Describe every shard file in the directory
    pub fn list_shards(&self) -> Result<Vec<ShardInfo>> {
        Ok(ShardInfo::scan_dir(&self.dir)?)
    }

    /// Open an existing file and check its version sentinel
    ///
    /// Open failures are reported as validation failures. The connection is
    /// dropped before returning an error, so the file can be renamed.
    fn open_existing(&self, path: &Path) -> Result<SqlEngine> {
        let engine = SqlEngine::open(path, self.busy_timeout)
            .map_err(|e| Error::validation(path, e.to_string()))?;
        schema::validate(&engine)?;
        Ok(engine)
    }

    fn create(&self, path: &Path) -> Result<SqlEngine> {
        let mut engine = SqlEngine::open(path, self.busy_timeout)?;
        schema::initialize(&mut engine)?;
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::ShardState;
    use std::fs;
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn may_2023() -> ShardMonth {
        ShardMonth::new(2023, 5).unwrap()
    }

    #[test]
    fn test_absent_shard_is_created() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = ShardManager::new(temp_dir.path(), TIMEOUT);

        let (engine, current) = manager.open_current(may_2023())?;
        assert_eq!(current.outcome, OpenOutcome::Created);
        assert_eq!(current.id, "2305");
        assert_eq!(current.path, temp_dir.path().join("database_2305.db"));
        assert!(current.path.exists());
        schema::validate(&engine)?;

        Ok(())
    }

    #[test]
    fn test_valid_shard_is_reopened_untouched() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = ShardManager::new(temp_dir.path(), TIMEOUT);

        {
            let (engine, _) = manager.open_current(may_2023())?;
            engine.execute("INSERT INTO FILE(file_name) VALUES ('a.exe')")?;
        }

        let (engine, current) = manager.open_current(may_2023())?;
        assert_eq!(current.outcome, OpenOutcome::Opened);
        assert_eq!(engine.query("SELECT file_name FROM FILE")?.len(), 1);
        assert!(!temp_dir.path().join("database_2305.db.corrupt").exists());

        Ok(())
    }

    #[test_log::test]
    fn test_tampered_shard_is_recreated() -> Result<()> {
        let temp_dir = tempdir()?;
        let metrics = Arc::new(DatabaseMetrics::new());
        let manager = ShardManager::new(temp_dir.path(), TIMEOUT).with_metrics(metrics.clone());

        {
            let (engine, _) = manager.open_current(may_2023())?;
            engine.execute("UPDATE VERSION SET version = 'tampered'")?;
        }

        let (engine, current) = manager.open_current(may_2023())?;
        let corrupt = temp_dir.path().join("database_2305.db.corrupt");
        assert_eq!(
            current.outcome,
            OpenOutcome::Recreated {
                quarantined_to: corrupt.clone()
            }
        );
        assert_eq!(current.outcome.transitions()[1], ShardState::Quarantined);
        assert!(corrupt.exists());
        schema::validate(&engine)?;
        assert_eq!(metrics.snapshot().shards_quarantined, 1);

        Ok(())
    }

    #[test]
    fn test_garbage_file_is_recreated() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("database_2305.db");
        let garbage = vec![0xa5u8; 8192];
        fs::write(&path, &garbage)?;

        let manager = ShardManager::new(temp_dir.path(), TIMEOUT);
        let (_, current) = manager.open_current(may_2023())?;

        assert!(current.outcome.was_recreated());
        let corrupt = temp_dir.path().join("database_2305.db.corrupt");
        assert_eq!(fs::read(&corrupt)?, garbage);

        Ok(())
    }

    #[test]
    fn test_list_shards() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = ShardManager::new(temp_dir.path(), TIMEOUT);

        manager.open_current(ShardMonth::new(2023, 4).unwrap())?;
        manager.open_current(may_2023())?;

        let ids: Vec<_> = manager.list_shards()?.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["2304", "2305"]);

        Ok(())
    }

    #[test]
    fn test_missing_directory_fails_to_create() {
        let temp_dir = tempdir().unwrap();
        let manager = ShardManager::new(temp_dir.path().join("absent"), TIMEOUT);

        assert!(matches!(manager.open_current(may_2023()), Err(Error::Open { .. })));
    }

    #[test]
    fn test_quarantine_failure_reports_error() {
        let temp_dir = tempdir().unwrap();
        let metrics = Arc::new(DatabaseMetrics::new());
        let manager = ShardManager::new(temp_dir.path(), TIMEOUT).with_metrics(metrics.clone());

        let err = manager
            .quarantine(&temp_dir.path().join("database_2305.db"))
            .unwrap_err();
        assert!(matches!(err, Error::Quarantine { .. }));
        assert_eq!(metrics.snapshot().quarantine_failures, 1);
    }

    #[test_log::test]
    fn test_quarantine_failure_is_fatal() -> Result<()> {
        let temp_dir = tempdir()?;
        let metrics = Arc::new(DatabaseMetrics::new());

        {
            let (engine, _) = ShardManager::new(temp_dir.path(), TIMEOUT).open_current(may_2023())?;
            engine.execute("UPDATE VERSION SET version = 'tampered'")?;
        }

        let manager = ShardManager::new(temp_dir.path(), TIMEOUT)
            .with_metrics(metrics.clone())
            .deny_quarantine();
        let err = manager.open_current(may_2023()).unwrap_err();

        assert!(matches!(err, Error::Quarantine { .. }));
        assert!(temp_dir.path().join("database_2305.db").exists());
        assert!(!temp_dir.path().join("database_2305.db.corrupt").exists());
        assert_eq!(metrics.snapshot().quarantine_failures, 1);
        assert_eq!(metrics.snapshot().shards_quarantined, 0);

        Ok(())
    }

    #[test]
    fn test_ensure_dir() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = ShardManager::new(temp_dir.path().join("telemetry"), TIMEOUT);

        manager.ensure_dir()?;
        assert!(manager.dir().is_dir());

        Ok(())
    }
}
