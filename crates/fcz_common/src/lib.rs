//! Shared foundational types used across the fcz cache crates.
//!
//! Currently this is the content hash stored alongside every cached record so
//! replayed payloads can be checked against the bytes that were compressed.

#![warn(missing_docs)]

pub mod hash;

pub use hash::ContentHash;
