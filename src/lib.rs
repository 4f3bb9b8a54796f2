//! # huntstore
//!
//! Local persistence for a host telemetry and threat-hunting agent. File,
//! registry, network and process events live in SQLite files sharded by
//! calendar month (`database_<YYMM>.db`), shared by any number of processes on
//! the same host.
//!
//! - Every read and write takes one cross-process directory lock, so
//!   operations never interleave.
//! - The current month's shard is validated against a version sentinel on
//!   open; a bad shard is renamed to `.corrupt` and recreated, never deleted.
//! - [`Database::search`] runs a statement over every shard and skips (and
//!   quarantines) the ones that fail.
//! - [`Database::update`] applies a batch to the current shard all-or-nothing.
//!
//! ```no_run
//! use huntstore::Database;
//!
//! # fn main() -> huntstore::Result<()> {
//! let db = Database::open("/var/lib/agent/telemetry")?;
//! db.update([
//!     "INSERT INTO PROCESS(process_path, process_id) VALUES ('C:\\Windows\\cmd.exe', 4242)",
//! ])?;
//! for row in db.search("SELECT process_path, process_id FROM PROCESS")? {
//!     println!("{:?}", row);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod query;
pub mod schema;
pub mod shard;
pub mod store;

pub use config::DatabaseConfig;
pub use engine::{EngineTransaction, Record, SqlEngine};
pub use error::{Error, Result};
pub use lock::{DirectoryLock, DirectoryLockGuard};
pub use metrics::{DatabaseMetrics, MetricsSnapshot};
pub use query::{MergeQuery, MergeResult, QuarantineReport};
pub use schema::SCHEMA_VERSION;
pub use shard::{CurrentShard, OpenOutcome, ShardId, ShardInfo, ShardMonth, ShardState};
pub use store::Database;
