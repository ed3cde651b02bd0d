//! Cache file naming convention.
//!
//! A cache file is named `bin_v<version>_cache.fcz`. Any directory entry whose
//! name contains both [`CACHE_NAME_MARKER`] and [`CACHE_EXT_MARKER`] belongs to
//! the convention, whatever version it carries.

/// Marker every cache file name contains.
pub const CACHE_NAME_MARKER: &str = "bin_";

/// Extension marker every cache file name contains.
pub const CACHE_EXT_MARKER: &str = "cache.fcz";

/// Suffix of the work file a build appends to before it is committed.
const WORK_SUFFIX: &str = ".partial";

/// Returns the canonical cache file name for a format version.
pub fn cache_file_name(version: u32) -> String {
    format!("{CACHE_NAME_MARKER}v{version}_{CACHE_EXT_MARKER}")
}

/// Returns the name of the in-progress build file for a format version.
///
/// The name still matches the convention, so a build that never finished is
/// purged as stale on the next open.
pub fn work_file_name(version: u32) -> String {
    format!("{}{WORK_SUFFIX}", cache_file_name(version))
}

/// Returns `true` if `name` follows the cache naming convention.
pub fn is_cache_file_name(name: &str) -> bool {
    name.contains(CACHE_NAME_MARKER) && name.contains(CACHE_EXT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_format() {
        assert_eq!(cache_file_name(1), "bin_v1_cache.fcz");
        assert_eq!(cache_file_name(42), "bin_v42_cache.fcz");
    }

    #[test]
    fn work_name_follows_convention() {
        let work = work_file_name(7);
        assert_eq!(work, "bin_v7_cache.fcz.partial");
        assert!(is_cache_file_name(&work));
        assert_ne!(work, cache_file_name(7));
    }

    #[test]
    fn convention_requires_both_markers() {
        assert!(is_cache_file_name("bin_v3_cache.fcz"));
        assert!(is_cache_file_name("old_bin_cache.fcz"));
        assert!(!is_cache_file_name("bin_data.png"));
        assert!(!is_cache_file_name("cache.fcz"));
        assert!(!is_cache_file_name("sprite.png"));
    }
}
