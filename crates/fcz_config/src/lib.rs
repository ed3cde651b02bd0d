//! Parsing and validation of `fcz.toml` cache settings.
//!
//! This crate reads the optional settings file that sits next to a cached
//! directory and produces a strongly-typed [`CacheSettings`] holding the cache
//! format version, the source file pattern, and the compression parameters.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
