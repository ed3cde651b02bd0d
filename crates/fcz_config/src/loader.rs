//! Settings file loading and validation.

use crate::error::ConfigError;
use crate::types::{CacheSettings, MAX_COMPRESSION_LEVEL};
use std::path::Path;

/// Name of the settings file looked up inside a cached directory.
pub const CONFIG_FILE: &str = "fcz.toml";

/// Loads and validates `fcz.toml` from a directory.
///
/// Reads `<dir>/fcz.toml`, parses it, and validates the values.
pub fn load_config(dir: &Path) -> Result<CacheSettings, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates settings from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<CacheSettings, ConfigError> {
    let raw: toml::Table =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    let has_version = raw
        .get("cache")
        .and_then(|cache| cache.get("version"))
        .is_some();
    if !has_version {
        return Err(ConfigError::MissingField("cache.version".to_string()));
    }

    let settings: CacheSettings = toml::Value::Table(raw)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;
    validate_config(&settings)?;
    Ok(settings)
}

/// Validates that configuration values are within their accepted ranges.
fn validate_config(settings: &CacheSettings) -> Result<(), ConfigError> {
    if settings.compression.level > MAX_COMPRESSION_LEVEL {
        return Err(ConfigError::ValidationError(format!(
            "compression.level must be 0..={MAX_COMPRESSION_LEVEL}, got {}",
            settings.compression.level
        )));
    }
    if settings.cache.pattern.contains(['/', '\\']) {
        return Err(ConfigError::ValidationError(format!(
            "cache.pattern must match a file name, not a path: {:?}",
            settings.cache.pattern
        )));
    }
    Ok(())
}
