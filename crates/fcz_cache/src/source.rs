//! Enumeration of the source files a build compresses.

use std::path::{Path, PathBuf};

use fcz_config::CONFIG_FILE;

use crate::error::CacheError;
use crate::naming::is_cache_file_name;

/// One on-disk file selected for caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    name: String,
}

impl SourceFile {
    /// Returns the full path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name within its directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the whole file.
    pub fn read(&self) -> Result<Vec<u8>, CacheError> {
        std::fs::read(&self.path).map_err(|e| CacheError::io(&self.path, e))
    }
}

/// Lists the regular files directly inside `dir` whose name contains `pattern`.
///
/// Cache files and the `fcz.toml` settings file are never listed. The result is sorted by file name
/// so that builds are reproducible across platforms.
pub fn list_sources(dir: &Path, pattern: &str) -> Result<Vec<SourceFile>, CacheError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(dir, e))?;
        let path = entry.path();
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!(
                target = "fcz.cache",
                path = %path.display(),
                "skipping non UTF-8 file name"
            );
            continue;
        };
        if is_cache_file_name(&name) || name == CONFIG_FILE {
            continue;
        }
        if !name.contains(pattern) || !path.is_file() {
            continue;
        }
        files.push(SourceFile { path, name });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
