use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use serde::Serialize;

/// Operation counters for a [`Database`](crate::Database) handle
#[derive(Debug)]
pub struct DatabaseMetrics {
    // Operation counts
    /// Number of merge searches
    search_count: AtomicUsize,
    /// Number of update batches committed
    update_count: AtomicUsize,
    /// Number of update batches rolled back
    failed_update_count: AtomicUsize,
    /// Number of statements executed inside committed batches
    statements_executed: AtomicUsize,

    // Shard metrics
    /// Number of shard files queried
    shards_scanned: AtomicUsize,
    /// Number of shard files renamed aside
    shards_quarantined: AtomicUsize,
    /// Number of quarantine renames that failed
    quarantine_failures: AtomicUsize,
    /// Number of rows returned by searches
    rows_returned: AtomicUsize,

    // Lock metrics
    /// Number of directory lock acquisitions
    lock_acquisitions: AtomicUsize,
    /// Number of lock waits that timed out
    lock_timeouts: AtomicUsize,
    /// Total lock wait in nanoseconds
    lock_wait_ns: AtomicU64,

    // Timing metrics
    /// Total search duration in nanoseconds
    search_duration_ns: AtomicU64,
    /// Last search duration
    last_search_duration: Mutex<Duration>,

    start_time: Instant,
}

impl Default for DatabaseMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            search_count: AtomicUsize::new(0),
            update_count: AtomicUsize::new(0),
            failed_update_count: AtomicUsize::new(0),
            statements_executed: AtomicUsize::new(0),

            shards_scanned: AtomicUsize::new(0),
            shards_quarantined: AtomicUsize::new(0),
            quarantine_failures: AtomicUsize::new(0),
            rows_returned: AtomicUsize::new(0),

            lock_acquisitions: AtomicUsize::new(0),
            lock_timeouts: AtomicUsize::new(0),
            lock_wait_ns: AtomicU64::new(0),

            search_duration_ns: AtomicU64::new(0),
            last_search_duration: Mutex::new(Duration::ZERO),

            start_time: Instant::now(),
        }
    }

    /// Record a finished merge search
    pub fn record_search(&self, shards_scanned: usize, rows: usize, duration: Duration) {
        self.search_count.fetch_add(1, Ordering::Relaxed);
        self.shards_scanned.fetch_add(shards_scanned, Ordering::Relaxed);
        self.rows_returned.fetch_add(rows, Ordering::Relaxed);
        self.search_duration_ns.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        *self.last_search_duration.lock() = duration;
    }

    /// Record a committed update batch
    pub fn record_update(&self, statements: usize) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        self.statements_executed.fetch_add(statements, Ordering::Relaxed);
    }

    /// Record a rolled back update batch
    pub fn record_failed_update(&self) {
        self.failed_update_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a shard renamed aside
    pub fn record_quarantine(&self) {
        self.shards_quarantined.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a quarantine rename that failed
    pub fn record_quarantine_failure(&self) {
        self.quarantine_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful lock acquisition
    pub fn record_lock_acquired(&self, waited: Duration) {
        self.lock_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.lock_wait_ns.fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a lock wait that ran out of time
    pub fn record_lock_timeout(&self, waited: Duration) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
        self.lock_wait_ns.fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Take a consistent-enough copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            searches: self.search_count.load(Ordering::Relaxed),
            updates: self.update_count.load(Ordering::Relaxed),
            failed_updates: self.failed_update_count.load(Ordering::Relaxed),
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            shards_scanned: self.shards_scanned.load(Ordering::Relaxed),
            shards_quarantined: self.shards_quarantined.load(Ordering::Relaxed),
            quarantine_failures: self.quarantine_failures.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
            lock_acquisitions: self.lock_acquisitions.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            lock_wait: Duration::from_nanos(self.lock_wait_ns.load(Ordering::Relaxed)),
            search_duration: Duration::from_nanos(self.search_duration_ns.load(Ordering::Relaxed)),
            last_search_duration: *self.last_search_duration.lock(),
            uptime: self.start_time.elapsed(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.search_count.store(0, Ordering::Relaxed);
        self.update_count.store(0, Ordering::Relaxed);
        self.failed_update_count.store(0, Ordering::Relaxed);
        self.statements_executed.store(0, Ordering::Relaxed);

        self.shards_scanned.store(0, Ordering::Relaxed);
        self.shards_quarantined.store(0, Ordering::Relaxed);
        self.quarantine_failures.store(0, Ordering::Relaxed);
        self.rows_returned.store(0, Ordering::Relaxed);

        self.lock_acquisitions.store(0, Ordering::Relaxed);
        self.lock_timeouts.store(0, Ordering::Relaxed);
        self.lock_wait_ns.store(0, Ordering::Relaxed);

        self.search_duration_ns.store(0, Ordering::Relaxed);
        *self.last_search_duration.lock() = Duration::ZERO;
    }
}

/// Point-in-time copy of [`DatabaseMetrics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub searches: usize,
    pub updates: usize,
    pub failed_updates: usize,
    pub statements_executed: usize,
    pub shards_scanned: usize,
    pub shards_quarantined: usize,
    pub quarantine_failures: usize,
    pub rows_returned: usize,
    pub lock_acquisitions: usize,
    pub lock_timeouts: usize,
    pub lock_wait: Duration,
    pub search_duration: Duration,
    pub last_search_duration: Duration,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Average rows returned per search
    pub fn avg_rows_per_search(&self) -> f64 {
        if self.searches == 0 {
            return 0.0;
        }
        self.rows_returned as f64 / self.searches as f64
    }

    /// Get a report of all metrics
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Huntstore Metrics Report ===\n\n");
        report.push_str(&format!("Uptime: {:?}\n\n", self.uptime));

        report.push_str("Operation Counts:\n");
        report.push_str(&format!("  Searches: {}\n", self.searches));
        report.push_str(&format!("  Updates: {}\n", self.updates));
        report.push_str(&format!("  Failed Updates: {}\n", self.failed_updates));
        report.push_str(&format!("  Statements Executed: {}\n\n", self.statements_executed));

        report.push_str("Shard Metrics:\n");
        report.push_str(&format!("  Shards Scanned: {}\n", self.shards_scanned));
        report.push_str(&format!("  Shards Quarantined: {}\n", self.shards_quarantined));
        report.push_str(&format!("  Quarantine Failures: {}\n", self.quarantine_failures));
        report.push_str(&format!("  Rows Returned: {}\n", self.rows_returned));
        report.push_str(&format!("  Avg. Rows per Search: {:.2}\n\n", self.avg_rows_per_search()));

        report.push_str("Lock Metrics:\n");
        report.push_str(&format!("  Acquisitions: {}\n", self.lock_acquisitions));
        report.push_str(&format!("  Timeouts: {}\n", self.lock_timeouts));
        report.push_str(&format!("  Total Wait: {:?}\n\n", self.lock_wait));

        report.push_str("Performance Metrics:\n");
        if self.searches > 0 {
            let avg_search = self.search_duration.as_micros() / self.searches as u128;
            report.push_str(&format!("  Avg. Search Time: {}µs\n", avg_search));
        }
        report.push_str(&format!("  Last Search Time: {:?}\n", self.last_search_duration));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_recording() {
        let metrics = DatabaseMetrics::new();

        metrics.record_search(3, 10, Duration::from_millis(4));
        metrics.record_search(2, 20, Duration::from_millis(6));
        metrics.record_update(5);
        metrics.record_failed_update();
        metrics.record_quarantine();
        metrics.record_quarantine_failure();
        metrics.record_lock_acquired(Duration::from_millis(1));
        metrics.record_lock_timeout(Duration::from_millis(2));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.searches, 2);
        assert_eq!(snapshot.shards_scanned, 5);
        assert_eq!(snapshot.rows_returned, 30);
        assert_eq!(snapshot.avg_rows_per_search(), 15.0);
        assert_eq!(snapshot.updates, 1);
        assert_eq!(snapshot.statements_executed, 5);
        assert_eq!(snapshot.failed_updates, 1);
        assert_eq!(snapshot.shards_quarantined, 1);
        assert_eq!(snapshot.quarantine_failures, 1);
        assert_eq!(snapshot.lock_acquisitions, 1);
        assert_eq!(snapshot.lock_timeouts, 1);
        assert_eq!(snapshot.lock_wait, Duration::from_millis(3));
        assert_eq!(snapshot.search_duration, Duration::from_millis(10));
        assert_eq!(snapshot.last_search_duration, Duration::from_millis(6));
    }

    #[test]
    fn test_metrics_report() {
        let metrics = DatabaseMetrics::new();
        metrics.record_search(1, 1, Duration::from_millis(1));

        let report = metrics.snapshot().report();
        assert!(report.contains("Operation Counts:"));
        assert!(report.contains("Shard Metrics:"));
        assert!(report.contains("Lock Metrics:"));
        assert!(report.contains("Avg. Search Time:"));
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = DatabaseMetrics::new();
        metrics.record_update(3);
        metrics.record_search(1, 1, Duration::from_millis(1));

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.updates, 0);
        assert_eq!(snapshot.searches, 0);
        assert_eq!(snapshot.last_search_duration, Duration::ZERO);
        assert_eq!(snapshot.avg_rows_per_search(), 0.0);
    }

    #[test]
    fn test_metrics_thread_safety() {
        let metrics = Arc::new(DatabaseMetrics::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_update(2);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.updates, 1000);
        assert_eq!(snapshot.statements_executed, 2000);
    }
}
