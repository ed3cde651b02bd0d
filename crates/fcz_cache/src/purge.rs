//! Removal of cache files from a directory.
//!
//! [`purge_stale`] is the version gate: it keeps the cache file for the
//! current version and deletes every other file under the naming convention.
//! [`clear_all`] wipes every cache file regardless of version.

use std::path::Path;

use crate::error::CacheError;
use crate::naming::{cache_file_name, is_cache_file_name};

/// Deletes every cache file in `dir` that does not belong to `version`.
///
/// Deletion is best-effort: a stale file that cannot be removed is logged and
/// skipped. Returns the number of files removed; a missing directory removes
/// nothing.
pub fn purge_stale(dir: &Path, version: u32) -> Result<usize, CacheError> {
    let current = cache_file_name(version);
    remove_matching(dir, Some(current.as_str()))
}

/// Deletes every cache file in `dir`, whatever version it carries.
///
/// Returns the number of files removed.
pub fn clear_all(dir: &Path) -> Result<usize, CacheError> {
    remove_matching(dir, None)
}

fn remove_matching(dir: &Path, keep: Option<&str>) -> Result<usize, CacheError> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(dir, e))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !is_cache_file_name(name) || keep == Some(name) {
            continue;
        }

        let path = entry.path();
        match keep {
            Some(_) => tracing::info!(
                target = "fcz.cache",
                path = %path.display(),
                "removing outdated cache file"
            ),
            None => tracing::debug!(
                target = "fcz.cache",
                path = %path.display(),
                "removing cache file"
            ),
        }
        if remove_file_best_effort(&path, "purge") {
            removed += 1;
        }
    }

    Ok(removed)
}

/// Removes a file, treating "already gone" as success and logging anything else.
pub(crate) fn remove_file_best_effort(path: &Path, reason: &'static str) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target = "fcz.cache",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove cache file"
            );
            false
        }
    }
}
