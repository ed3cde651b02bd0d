//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Accessor errors are scoped to a single entry: a caller that receives one
/// may fall back to loading that file directly. None of them leave the
/// session in a state that panics or blocks on later calls.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing a file.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The requested index does not name an entry in this session.
    #[error("no cache entry at index {index}")]
    NotFound {
        /// The requested index.
        index: usize,
    },

    /// The cache file holds no further records.
    #[error("cache exhausted at index {index}")]
    Exhausted {
        /// The requested index.
        index: usize,
    },

    /// The cache file header or a record frame is invalid or truncated.
    #[error("malformed cache file {path}: {reason}")]
    Malformed {
        /// The cache file path.
        path: PathBuf,
        /// Description of the framing problem.
        reason: String,
    },

    /// A replayed payload does not hash to the checksum stored with it.
    #[error("checksum mismatch in {path} at record {index}")]
    ChecksumMismatch {
        /// The cache file path.
        path: PathBuf,
        /// The record index.
        index: usize,
    },

    /// Compression or decompression failed.
    #[error("compression transform failed: {reason}")]
    Transform {
        /// Description of the codec failure.
        reason: String,
    },

    /// An index was requested out of the fixed record order.
    #[error("out-of-order access: expected index {expected}, got {requested}")]
    OutOfOrder {
        /// The index the session can serve next.
        expected: usize,
        /// The index the caller asked for.
        requested: usize,
    },
}

/// Coarse classification of a [`CacheError`] for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem failure.
    Io,
    /// No such entry.
    NotFound,
    /// Replay reached the end of the cache.
    Exhausted,
    /// The cache file is structurally invalid (includes checksum mismatches).
    Malformed,
    /// The codec rejected the data.
    Transform,
    /// The access order contract was violated.
    OutOfOrder,
}

impl CacheError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Io { .. } => ErrorKind::Io,
            CacheError::NotFound { .. } => ErrorKind::NotFound,
            CacheError::Exhausted { .. } => ErrorKind::Exhausted,
            CacheError::Malformed { .. } | CacheError::ChecksumMismatch { .. } => {
                ErrorKind::Malformed
            }
            CacheError::Transform { .. } => ErrorKind::Transform,
            CacheError::OutOfOrder { .. } => ErrorKind::OutOfOrder,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
