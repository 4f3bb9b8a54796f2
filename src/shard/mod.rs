//! Month-based shard management for telemetry storage
//!
//! Events are stored in one SQLite file per calendar month, named
//! `database_<YYMM>.db`. This module names and enumerates those files,
//! quarantines corrupt ones and drives the lifecycle of the current shard.

mod period;
mod info;
mod manager;
mod error;
pub(crate) mod util;

pub use period::ShardMonth;
pub use info::{ShardInfo, ShardState, OpenOutcome, CurrentShard};
pub use manager::ShardManager;
pub use error::{ShardError, ShardResult};
pub use util::{is_shard_file, list_dir, quarantine_path, quarantine_shard_file, shard_file_name, shard_id_from_path};

/// Shard ID type
pub type ShardId = String;

/// File name prefix shared by every shard file
pub(crate) const SHARD_FILE_PREFIX: &str = "database_";
/// File extension of shard files
pub(crate) const SHARD_FILE_EXTENSION: &str = "db";
/// Suffix appended to quarantined shard files
pub(crate) const QUARANTINE_SUFFIX: &str = "corrupt";
