//! Exclusive directory lock
//!
//! A host-wide, cross-process lock serializing every operation on a shard
//! directory. It is an advisory lock on a file with a fixed name, so it works
//! between independent processes as well as between threads of one process:
//! each acquisition opens its own file handle, and two handles never hold the
//! lock at the same time.
//!
//! The lock is coarse-grained. Whoever holds it owns the whole directory.
//! Release happens when the [`DirectoryLockGuard`] is dropped, on every exit
//! path of the protected operation.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metrics::DatabaseMetrics;

/// A named, cross-process exclusive lock
#[derive(Debug, Clone)]
pub struct DirectoryLock {
    path: PathBuf,
    poll_interval: Duration,
    metrics: Option<Arc<DatabaseMetrics>>,
}

impl DirectoryLock {
    /// Create a lock handle for the lock file at `path`
    ///
    /// Nothing is locked until [`acquire`](Self::acquire) is called.
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            metrics: None,
        }
    }

    /// Record acquisitions, timeouts and wait time
    pub fn with_metrics(mut self, metrics: Arc<DatabaseMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held or `timeout` elapses
    pub fn acquire(&self, timeout: Duration) -> Result<DirectoryLockGuard> {
        let file = self.open_lock_file()?;
        let start = Instant::now();

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    let waited = start.elapsed();
                    if let Some(metrics) = &self.metrics {
                        metrics.record_lock_acquired(waited);
                    }
                    debug!(path = %self.path.display(), waited_ms = waited.as_millis() as u64, "directory lock acquired");
                    return Ok(DirectoryLockGuard {
                        file,
                        path: self.path.clone(),
                    });
                }
                Err(e) if is_contended(&e) => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_lock_timeout(waited);
                        }
                        warn!(path = %self.path.display(), waited_ms = waited.as_millis() as u64, "timed out waiting for directory lock");
                        return Err(Error::lock_timeout(&self.path, waited));
                    }
                    thread::sleep(self.poll_interval.min(timeout - waited));
                }
                Err(e) => {
                    return Err(Error::lock(&self.path, format!("locking failed: {}", e)));
                }
            }
        }
    }

    /// Take the lock only if it is free right now
    pub fn try_acquire(&self) -> Result<Option<DirectoryLockGuard>> {
        let file = self.open_lock_file()?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_lock_acquired(Duration::ZERO);
                }
                Ok(Some(DirectoryLockGuard {
                    file,
                    path: self.path.clone(),
                }))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(Error::lock(&self.path, format!("locking failed: {}", e))),
        }
    }

    fn open_lock_file(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::lock(&self.path, format!("cannot open lock file: {}", e)))
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Proof of holding a [`DirectoryLock`]; the lock is released on drop
#[derive(Debug)]
pub struct DirectoryLockGuard {
    file: File,
    path: PathBuf,
}

impl DirectoryLockGuard {
    /// Path of the held lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for DirectoryLockGuard {
    fn drop(&mut self) {
        // Closing the handle releases the lock even if the explicit unlock fails
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "explicit unlock failed, relying on close");
        } else {
            debug!(path = %self.path.display(), "directory lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use tempfile::tempdir;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn test_acquire_and_release() -> Result<()> {
        let temp_dir = tempdir()?;
        let lock = DirectoryLock::new(temp_dir.path().join("test.lock"), POLL);

        let guard = lock.acquire(Duration::from_secs(1))?;
        assert_eq!(guard.path(), lock.path());
        assert!(lock.try_acquire()?.is_none());

        guard.release();
        assert!(lock.try_acquire()?.is_some());

        Ok(())
    }

    #[test_log::test]
    fn test_timeout_leaves_holder_intact() -> Result<()> {
        let temp_dir = tempdir()?;
        let metrics = Arc::new(DatabaseMetrics::new());
        let lock = DirectoryLock::new(temp_dir.path().join("test.lock"), POLL)
            .with_metrics(metrics.clone());

        let holder = lock.acquire(Duration::from_secs(1))?;

        let start = Instant::now();
        let err = lock.acquire(Duration::from_millis(100)).unwrap_err();
        assert!(err.is_lock_timeout());
        assert!(start.elapsed() >= Duration::from_millis(100));

        // The original holder still owns the lock
        assert!(lock.try_acquire()?.is_none());
        assert_eq!(metrics.snapshot().lock_timeouts, 1);

        drop(holder);
        assert!(lock.try_acquire()?.is_some());

        Ok(())
    }

    #[test]
    fn test_lock_excludes_other_threads() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("test.lock");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = DirectoryLock::new(path.clone(), POLL);
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                let barrier = barrier.clone();
                thread::spawn(move || -> Result<()> {
                    barrier.wait();
                    for _ in 0..10 {
                        let _guard = lock.acquire(Duration::from_secs(10))?;
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap()?;
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_guard_released_on_error_path() -> Result<()> {
        let temp_dir = tempdir()?;
        let lock = DirectoryLock::new(temp_dir.path().join("test.lock"), POLL);

        let failing = || -> Result<()> {
            let _guard = lock.acquire(Duration::from_secs(1))?;
            Err(Error::query("boom"))
        };
        assert!(failing().is_err());

        assert!(lock.try_acquire()?.is_some());
        Ok(())
    }

    #[test]
    fn test_missing_lock_directory() {
        let temp_dir = tempdir().unwrap();
        let lock = DirectoryLock::new(temp_dir.path().join("absent").join("test.lock"), POLL);
        assert!(matches!(lock.acquire(Duration::from_millis(10)), Err(Error::Lock { .. })));
    }
}
