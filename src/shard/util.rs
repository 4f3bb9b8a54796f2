//! Utility functions for shard management
//!
//! Provides helper functions for naming, enumerating and quarantining shard files.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::fs;

use tracing::warn;

use crate::shard::{ShardId, ShardError, ShardResult, SHARD_FILE_PREFIX, SHARD_FILE_EXTENSION, QUARANTINE_SUFFIX};

/// Get the file name for a shard
pub fn shard_file_name(shard_id: &str) -> String {
    format!("{}{}.{}", SHARD_FILE_PREFIX, shard_id, SHARD_FILE_EXTENSION)
}

/// Get the path for a shard file
pub fn shard_path(base_dir: &Path, shard_id: &str) -> PathBuf {
    base_dir.join(shard_file_name(shard_id))
}

/// Recover the shard ID from a shard file path
///
/// Returns `None` for anything not named `database_<id>.db`, which includes
/// quarantined files, SQLite journals and the lock file.
pub fn shard_id_from_path(path: &Path) -> Option<ShardId> {
    let name = path.file_name()?.to_str()?;
    let id = name
        .strip_prefix(SHARD_FILE_PREFIX)?
        .strip_suffix(SHARD_FILE_EXTENSION)?
        .strip_suffix('.')?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

/// Check if a path is named like a shard file
pub fn is_shard_file(path: &Path) -> bool {
    shard_id_from_path(path).is_some()
}

/// List every regular file in a directory, non-recursively
///
/// Entries are sorted by file name so merge results are reproducible.
pub fn list_dir(dir: &Path) -> ShardResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| ShardError::Enumeration {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut result = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|source| ShardError::Enumeration {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if path.is_file() {
            result.push(path);
        }
    }

    result.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(result)
}

/// List all shard files in a directory together with their IDs
pub fn list_shard_files(dir: &Path) -> ShardResult<Vec<(ShardId, PathBuf)>> {
    Ok(list_dir(dir)?
        .into_iter()
        .filter_map(|path| shard_id_from_path(&path).map(|id| (id, path)))
        .collect())
}

/// Get the quarantine path for a shard file
///
/// This is `<path>.corrupt`, or `<path>.<n>.corrupt` with the smallest free
/// `n` when earlier evidence already occupies that name.
pub fn quarantine_path(path: &Path) -> PathBuf {
    let base = path.as_os_str().to_os_string();

    let mut candidate = base.clone();
    candidate.push(format!(".{}", QUARANTINE_SUFFIX));
    let mut candidate = PathBuf::from(candidate);

    let mut n = 1u32;
    while candidate.exists() {
        let mut next = base.clone();
        next.push(format!(".{}.{}", n, QUARANTINE_SUFFIX));
        candidate = PathBuf::from(next);
        n += 1;
    }

    candidate
}

/// SQLite rollback journal belonging to a database file
pub fn journal_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("-journal");
    PathBuf::from(name)
}

/// Rename a shard file to its quarantine name, never deleting it
///
/// A rollback journal next to the shard moves with it, so the quarantined
/// copy can still be recovered.
pub fn quarantine_shard_file(path: &Path) -> ShardResult<PathBuf> {
    let target = quarantine_path(path);

    fs::rename(path, &target).map_err(|source| ShardError::Quarantine {
        path: path.to_path_buf(),
        target: target.clone(),
        source,
    })?;

    let journal = journal_path(path);
    if journal.exists() {
        let journal_target = journal_path(&target);
        if let Err(e) = fs::rename(&journal, &journal_target) {
            warn!(journal = %journal.display(), target = %journal_target.display(), error = %e, "journal left behind by quarantine");
        }
    }

    Ok(target)
}

/// Create the shard directory if it doesn't exist
pub fn ensure_shard_dir(dir: &Path) -> ShardResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            ShardError::file_error(dir, format!("Failed to create shard directory: {}", e))
        })?;
    }

    Ok(())
}
