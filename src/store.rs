use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::engine::{Record, SqlEngine};
use crate::error::{Error, Result};
use crate::lock::DirectoryLock;
use crate::metrics::{DatabaseMetrics, MetricsSnapshot};
use crate::query::{MergeQuery, MergeResult};
use crate::shard::{CurrentShard, OpenOutcome, ShardInfo, ShardManager, ShardMonth};

/// The current shard's write connection and how it was reached
#[derive(Debug)]
struct CurrentState {
    /// `None` after a search quarantined the current shard and recreating it failed
    engine: Option<SqlEngine>,
    shard: CurrentShard,
}

/// A handle on one shard directory
///
/// Every operation takes the directory lock first, so operations from any
/// thread or process using the same lock file never overlap.
#[derive(Debug)]
pub struct Database {
    /// Shard directory
    directory: PathBuf,
    /// Handle configuration
    config: DatabaseConfig,
    /// Cross-process directory lock
    lock: DirectoryLock,
    /// Shard lifecycle manager
    shards: ShardManager,
    /// Current shard
    current: Mutex<CurrentState>,
    /// Metrics collector
    metrics: Arc<DatabaseMetrics>,
}

impl Database {
    /// Open a shard directory with default configuration
    ///
    /// Shard ids are two-digit `YYMM`, so only dates in 2000-2099 have a
    /// shard; outside that window this fails with [`Error::Shard`].
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with_config(dir, DatabaseConfig::default())
    }

    /// Open a shard directory; the current shard is picked from today's local date
    ///
    /// Fails with [`Error::Shard`] when today falls outside 2000-2099.
    pub fn open_with_config<P: AsRef<Path>>(dir: P, config: DatabaseConfig) -> Result<Self> {
        Self::open_for_date(dir, config, Local::now().date_naive())
    }

    /// Open a shard directory with `date` deciding the current shard
    ///
    /// `date` must fall in 2000-2099 so its `YYMM` id stays unique and sorts
    /// chronologically; other dates fail with [`Error::Shard`] before any
    /// file is touched.
    pub fn open_for_date<P: AsRef<Path>>(
        dir: P,
        config: DatabaseConfig,
        date: NaiveDate,
    ) -> Result<Self> {
        config.validate()?;

        let directory = dir.as_ref().to_path_buf();
        let month = ShardMonth::from_date(date)?;

        let metrics = Arc::new(DatabaseMetrics::new());
        let lock = DirectoryLock::new(config.lock_path(&directory), config.lock_poll_interval)
            .with_metrics(metrics.clone());
        let shards = ShardManager::new(&directory, config.busy_timeout).with_metrics(metrics.clone());

        if config.create_directory {
            shards.ensure_dir()?;
        } else if !directory.is_dir() {
            return Err(Error::open(&directory, "shard directory does not exist"));
        }

        let guard = if config.lock_during_open {
            Some(lock.acquire(config.lock_timeout)?)
        } else {
            None
        };
        let (engine, shard) = shards.open_current(month)?;
        drop(guard);

        debug!(dir = %directory.display(), shard = %shard.id, outcome = ?shard.outcome, "database ready");

        Ok(Self {
            directory,
            config,
            lock,
            shards,
            current: Mutex::new(CurrentState {
                engine: Some(engine),
                shard,
            }),
            metrics,
        })
    }

    /// Run a read statement against every shard and concatenate the rows
    ///
    /// Shards that fail are quarantined and left out. Only a lock timeout or
    /// failing to list the directory makes this return an error.
    pub fn search(&self, statement: &str) -> Result<Vec<Record>> {
        Ok(self.search_detailed(statement)?.records)
    }

    /// Like [`search`](Self::search), also reporting every shard that was set aside
    pub fn search_detailed(&self, statement: &str) -> Result<MergeResult> {
        let _guard = self.lock.acquire(self.config.lock_timeout)?;
        let start = Instant::now();

        let result = MergeQuery::new(&self.shards, statement, self.config.busy_timeout).execute()?;

        {
            let mut current = self.current.lock();
            let moved = result
                .quarantined
                .iter()
                .find(|r| r.path == current.shard.path)
                .and_then(|r| r.quarantined_to.clone());
            if let Some(quarantined_to) = moved {
                self.recreate_current(&mut current, quarantined_to);
            }
        }

        self.metrics
            .record_search(result.shards_scanned, result.records.len(), start.elapsed());

        Ok(result)
    }

    /// Execute write statements as one transaction on the current shard
    ///
    /// Either every statement takes effect or none does. A failing statement
    /// is reported as [`Error::Exec`] with its position in the batch.
    pub fn update<I, S>(&self, statements: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let _guard = self.lock.acquire(self.config.lock_timeout)?;
        let mut current = self.current.lock();
        let engine = self.current_engine(&mut current)?;

        let tx = engine.transaction()?;
        let result = tx
            .execute_all(statements)
            .and_then(|executed| tx.commit().map(|()| executed));

        match result {
            Ok(executed) => {
                self.metrics.record_update(executed);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failed_update();
                debug!(error = %e, "update rolled back");
                Err(e)
            }
        }
    }

    /// Describe every shard file in the directory
    pub fn list_shards(&self) -> Result<Vec<ShardInfo>> {
        let _guard = self.lock.acquire(self.config.lock_timeout)?;
        self.shards.list_shards()
    }

    /// The shard that receives writes
    pub fn current_shard(&self) -> CurrentShard {
        self.current.lock().shard.clone()
    }

    /// The shard directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The configuration this handle was opened with
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Path of the lock file guarding the directory
    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    /// Current operation counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The write connection, reopening the current shard if it was set aside
    ///
    /// Another handle's search may have quarantined the file this connection
    /// still points at; that is noticed here and the shard is reopened.
    fn current_engine<'s>(&self, state: &'s mut CurrentState) -> Result<&'s mut SqlEngine> {
        if state.engine.as_ref().map_or(false, SqlEngine::has_moved) {
            warn!(shard = %state.shard.id, "current shard file was moved, reopening");
            state.engine = None;
        }
        if state.engine.is_none() {
            let (engine, shard) = self.shards.open_current(state.shard.month)?;
            info!(shard = %shard.id, "reopened current shard");
            state.shard = shard;
            state.engine = Some(engine);
        }
        state
            .engine
            .as_mut()
            .ok_or_else(|| Error::shard("current shard is not open"))
    }

    fn recreate_current(&self, state: &mut CurrentState, quarantined_to: PathBuf) {
        // The old connection still points at the renamed file
        state.engine = None;

        match self.shards.open_current(state.shard.month) {
            Ok((engine, mut shard)) => {
                shard.outcome = OpenOutcome::Recreated { quarantined_to };
                info!(shard = %shard.id, "recreated current shard after search");
                state.shard = shard;
                state.engine = Some(engine);
            }
            Err(e) => {
                warn!(shard = %state.shard.id, error = %e, "cannot recreate current shard, retrying on next update");
            }
        }
    }
}
