//! Shard information data structures
//!
//! Describes shard files on disk and how the current shard reached its
//! initialized state.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, NaiveDate, Utc};
use crate::shard::{util, ShardId, ShardMonth, ShardResult};

/// Lifecycle state of the current shard during construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardState {
    /// No file exists for the shard
    Absent,
    /// A file exists and its version sentinel checks out
    PresentValid,
    /// A file exists but cannot be opened or fails the sentinel check
    PresentInvalid,
    /// The invalid file was renamed aside
    Quarantined,
    /// An open, schema-complete shard is ready
    Initialized,
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardState::Absent => write!(f, "absent"),
            ShardState::PresentValid => write!(f, "present-valid"),
            ShardState::PresentInvalid => write!(f, "present-invalid"),
            ShardState::Quarantined => write!(f, "quarantined"),
            ShardState::Initialized => write!(f, "initialized"),
        }
    }
}

/// How the current shard reached `Initialized`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// No file existed; a fresh shard was created
    Created,
    /// An existing valid shard was reopened
    Opened,
    /// An invalid shard was quarantined and a fresh one created in its place
    Recreated {
        /// Where the invalid file was moved
        quarantined_to: PathBuf,
    },
}

impl OpenOutcome {
    /// States visited on the way to `Initialized`
    pub fn transitions(&self) -> &'static [ShardState] {
        match self {
            OpenOutcome::Created => &[ShardState::Absent, ShardState::Initialized],
            OpenOutcome::Opened => &[ShardState::PresentValid, ShardState::Initialized],
            OpenOutcome::Recreated { .. } => &[
                ShardState::PresentInvalid,
                ShardState::Quarantined,
                ShardState::Initialized,
            ],
        }
    }

    /// Check if a file was quarantined while opening
    pub fn was_recreated(&self) -> bool {
        matches!(self, OpenOutcome::Recreated { .. })
    }
}

/// Information about a shard file
#[derive(Debug, Clone)]
pub struct ShardInfo {
    /// Shard ID (`YYMM`)
    pub id: ShardId,
    /// Month the shard covers, if the ID parses
    pub month: Option<ShardMonth>,
    /// Path of the shard file
    pub path: PathBuf,
    /// Size of the file in bytes
    pub size_bytes: u64,
    /// Last modification time of the file
    pub modified: Option<DateTime<Utc>>,
}

impl ShardInfo {
    /// Create shard info from a shard file on disk
    pub fn from_path(id: ShardId, path: &Path) -> ShardResult<Self> {
        let metadata = fs::metadata(path)?;
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        Ok(Self {
            month: ShardMonth::parse_shard_id(&id).ok(),
            id,
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            modified,
        })
    }

    /// Collect info for every shard file in a directory
    pub fn scan_dir(dir: &Path) -> ShardResult<Vec<Self>> {
        util::list_shard_files(dir)?
            .into_iter()
            .map(|(id, path)| Self::from_path(id, &path))
            .collect()
    }

    /// Check if a date falls in this shard's month
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.month.map_or(false, |m| m.contains(date))
    }
}

/// The shard currently open for writing
#[derive(Debug, Clone)]
pub struct CurrentShard {
    /// Shard ID (`YYMM`)
    pub id: ShardId,
    /// Month the shard covers
    pub month: ShardMonth,
    /// Path of the shard file
    pub path: PathBuf,
    /// How the shard was reached at construction
    pub outcome: OpenOutcome,
}
