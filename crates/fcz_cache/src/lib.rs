//! Persistent, versioned cache of compressed directory contents.
//!
//! The first time a directory is opened its matching files are compressed as
//! they are requested and appended to a single `bin_v<version>_cache.fcz`
//! file. Later sessions with the same version replay the compressed records
//! from that file instead of listing and compressing the directory again.
//! Cache files for any other version are purged on open.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use fcz_cache::{CacheSession, CacheSettings};
//!
//! # fn main() -> Result<(), fcz_cache::CacheError> {
//! let settings = CacheSettings::new(7, ".png");
//! let mut session = CacheSession::open(Path::new("assets/sprites"), &settings)?;
//! for index in 0..session.declared_count() {
//!     let name = session.next_name(index)?;
//!     let bytes = session.next_content(index, &name)?;
//!     println!("{name}: {} bytes", bytes.len());
//! }
//! session.finish();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod codec;
pub mod error;
mod frame;
pub mod naming;
pub mod purge;
pub mod session;
pub mod source;

pub use codec::{Codec, FlateCodec};
pub use error::{CacheError, ErrorKind};
pub use fcz_config::{CacheSettings, CompressionFormat};
pub use frame::MAX_PAYLOAD_BYTES;
pub use naming::{cache_file_name, is_cache_file_name};
pub use purge::{clear_all, purge_stale};
pub use session::{CacheSession, FinishReport, SessionMode};
pub use source::SourceFile;
