//! Settings types deserialized from `fcz.toml`.

use serde::Deserialize;

/// Default zlib/gzip compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Highest compression level accepted by the flate codecs.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// The top-level settings parsed from `fcz.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CacheSettings {
    /// Cache identity: format version and source file selection.
    pub cache: CacheSection,
    /// Compression parameters for newly built caches.
    #[serde(default)]
    pub compression: CompressionConfig,
}

impl CacheSettings {
    /// Creates settings for the given version and pattern with default compression.
    pub fn new(version: u32, pattern: impl Into<String>) -> Self {
        Self {
            cache: CacheSection {
                version,
                pattern: pattern.into(),
            },
            compression: CompressionConfig::default(),
        }
    }

    /// Returns the cache format version.
    pub fn version(&self) -> u32 {
        self.cache.version
    }

    /// Returns the substring a source file name must contain to be cached.
    pub fn pattern(&self) -> &str {
        &self.cache.pattern
    }
}

/// The `[cache]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CacheSection {
    /// Cache format/content generation. Bumping it invalidates every cache file.
    pub version: u32,
    /// Substring filter applied to source file names. Empty matches every file.
    #[serde(default)]
    pub pattern: String,
}

/// The `[compression]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CompressionConfig {
    /// Stream format used for record payloads.
    #[serde(default)]
    pub format: CompressionFormat,
    /// Compression level, `0..=9`.
    #[serde(default = "default_level")]
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            format: CompressionFormat::default(),
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

fn default_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

/// Compressed stream format for record payloads.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    /// Deflate with a zlib header (default).
    #[default]
    Zlib,
    /// Deflate with a gzip header.
    Gzip,
    /// Raw deflate, no header.
    Deflate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_default_compression() {
        let settings = CacheSettings::new(3, ".png");
        assert_eq!(settings.version(), 3);
        assert_eq!(settings.pattern(), ".png");
        assert_eq!(settings.compression.format, CompressionFormat::Zlib);
        assert_eq!(settings.compression.level, DEFAULT_COMPRESSION_LEVEL);
    }

    #[test]
    fn compression_format_variants() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: CompressionFormat,
        }
        for (text, expected) in [
            ("zlib", CompressionFormat::Zlib),
            ("gzip", CompressionFormat::Gzip),
            ("deflate", CompressionFormat::Deflate),
        ] {
            let w: Wrapper = toml::from_str(&format!("format = \"{text}\"")).unwrap();
            assert_eq!(w.format, expected);
        }
    }

    #[test]
    fn unknown_compression_format_rejected() {
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            #[allow(dead_code)]
            format: CompressionFormat,
        }
        assert!(toml::from_str::<Wrapper>("format = \"brotli\"").is_err());
    }
}
