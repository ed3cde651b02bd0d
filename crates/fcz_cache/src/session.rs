//! Cache sessions over a single directory.
//!
//! A session is opened once per directory and is either *building* (no cache
//! file for the current version exists: sources are enumerated, compressed on
//! demand and appended to a new cache file) or *replaying* (the cache file is
//! parsed sequentially and each payload decompressed on demand). The mode is
//! fixed for the lifetime of the session.
//!
//! Entries are accessed by index in strictly increasing order. In replay mode
//! there is no seeking: the name of entry `i` is read before its content, and
//! asking for entry `i + 1` skips whatever of entry `i` was not read.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fcz_common::ContentHash;
use fcz_config::CacheSettings;

use crate::codec::{Codec, FlateCodec};
use crate::error::CacheError;
use crate::frame::{self, FrameError};
use crate::naming::{cache_file_name, work_file_name};
use crate::purge::{purge_stale, remove_file_best_effort};
use crate::source::{list_sources, SourceFile};

/// Which half of the protocol a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// No usable cache existed; entries are compressed and appended.
    Building,
    /// A cache file for the current version is being replayed.
    Replaying,
}

/// Outcome of [`CacheSession::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishReport {
    /// Mode the session ran in, `None` for a missing directory.
    pub mode: Option<SessionMode>,
    /// Number of entries declared when the session opened.
    pub declared_count: usize,
    /// Records appended (building) or fully read (replaying).
    pub records: usize,
    /// Whether a freshly built cache file was moved into place.
    pub committed: bool,
}

/// A single pass over the cached entries of one directory.
///
/// Dropping a session without calling [`finish`](Self::finish) performs the
/// same teardown.
pub struct CacheSession<C: Codec = FlateCodec> {
    dir: PathBuf,
    cache_path: PathBuf,
    declared_count: usize,
    state: State,
    codec: C,
}

enum State {
    Inert,
    Building(Builder),
    Replaying(Replayer),
    Closed,
}

impl CacheSession<FlateCodec> {
    /// Opens a session for `dir` using the version, pattern and compression
    /// parameters from `settings`.
    pub fn open(dir: &Path, settings: &CacheSettings) -> Result<Self, CacheError> {
        Self::with_codec(
            dir,
            settings.version(),
            settings.pattern(),
            FlateCodec::from_config(&settings.compression),
        )
    }
}

impl<C: Codec> CacheSession<C> {
    /// Opens a session for `dir` with an explicit codec.
    ///
    /// Stale cache files are purged first. If `dir` is missing or is not a
    /// directory the session is empty: it declares zero entries and every
    /// accessor returns [`CacheError::NotFound`].
    pub fn with_codec(
        dir: &Path,
        version: u32,
        pattern: &str,
        codec: C,
    ) -> Result<Self, CacheError> {
        let cache_path = dir.join(cache_file_name(version));
        let mut session = Self {
            dir: dir.to_path_buf(),
            cache_path,
            declared_count: 0,
            state: State::Inert,
            codec,
        };

        if !dir.is_dir() {
            tracing::debug!(
                target = "fcz.cache",
                dir = %dir.display(),
                "not a directory, cache session is empty"
            );
            return Ok(session);
        }

        if let Err(err) = purge_stale(dir, version) {
            tracing::warn!(
                target = "fcz.cache",
                dir = %dir.display(),
                error = %err,
                "stale cache purge failed, continuing"
            );
        }

        let format_id = session.codec.format_id();
        if session.cache_path.is_file() {
            if let Some((count, replayer)) = Replayer::open(&session.cache_path, format_id)? {
                tracing::info!(
                    target = "fcz.cache",
                    path = %session.cache_path.display(),
                    count,
                    "opened cache file for replay"
                );
                session.declared_count = count;
                session.state = State::Replaying(replayer);
                return Ok(session);
            }
        }

        let work_path = dir.join(work_file_name(version));
        let builder = Builder::start(dir, &work_path, pattern, format_id)?;
        tracing::info!(
            target = "fcz.cache",
            dir = %dir.display(),
            pattern,
            count = builder.pending.len(),
            "rebuilding cache"
        );
        session.declared_count = builder.pending.len();
        session.state = State::Building(builder);
        Ok(session)
    }

    /// Returns the mode of this session, or `None` for a missing directory.
    pub fn mode(&self) -> Option<SessionMode> {
        match self.state {
            State::Building(_) => Some(SessionMode::Building),
            State::Replaying(_) => Some(SessionMode::Replaying),
            State::Inert | State::Closed => None,
        }
    }

    /// Returns `true` if this session is building a new cache file.
    pub fn is_rebuilding(&self) -> bool {
        matches!(self.state, State::Building(_))
    }

    /// Number of entries the session expects to serve.
    pub fn declared_count(&self) -> usize {
        self.declared_count
    }

    /// Directory the session was opened for.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for the session's version.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Returns the name of entry `index`.
    ///
    /// While building this is a lookup and may be repeated. While replaying it
    /// consumes the name field of the next record and cannot be repeated.
    pub fn next_name(&mut self, index: usize) -> Result<String, CacheError> {
        match &mut self.state {
            State::Building(builder) => builder
                .pending
                .get(index)
                .map(|file| file.name().to_string())
                .ok_or(CacheError::NotFound { index }),
            State::Replaying(replayer) => {
                replayer.next_name(index, self.declared_count, &self.cache_path)
            }
            State::Inert | State::Closed => Err(CacheError::NotFound { index }),
        }
    }

    /// Returns the raw bytes of entry `index`.
    ///
    /// While building, the source file is read and compressed and a record
    /// named `name` is appended to the cache; a failed append is logged and
    /// keeps the cache from being committed, but the bytes are still returned.
    /// While replaying, `name` is ignored and the next record is decompressed.
    pub fn next_content(&mut self, index: usize, name: &str) -> Result<Vec<u8>, CacheError> {
        match &mut self.state {
            State::Building(builder) => builder.append(index, name, &self.codec),
            State::Replaying(replayer) => {
                replayer.next_content(index, self.declared_count, &self.cache_path, &self.codec)
            }
            State::Inert | State::Closed => Err(CacheError::NotFound { index }),
        }
    }

    /// Ends the session, releasing the source list and the cache file handle.
    ///
    /// A build is committed only if every declared entry was appended without
    /// a write failure; otherwise the partial file is removed and the next
    /// session rebuilds.
    pub fn finish(mut self) -> FinishReport {
        self.teardown()
    }

    fn teardown(&mut self) -> FinishReport {
        let mode = self.mode();
        let (records, committed) = match std::mem::replace(&mut self.state, State::Closed) {
            State::Building(builder) => builder.commit(&self.cache_path, self.declared_count),
            State::Replaying(replayer) => (replayer.records_read, false),
            State::Inert | State::Closed => (0, false),
        };
        FinishReport {
            mode,
            declared_count: self.declared_count,
            records,
            committed,
        }
    }
}

impl<C: Codec> Drop for CacheSession<C> {
    fn drop(&mut self) {
        if !matches!(self.state, State::Closed) {
            self.teardown();
        }
    }
}

/// Build-side state: the enumerated sources and the work file being appended.
struct Builder {
    pending: Vec<SourceFile>,
    work_path: PathBuf,
    writer: Option<Box<dyn Write>>,
    next: usize,
    written: usize,
    write_failed: bool,
}

impl Builder {
    fn start(
        dir: &Path,
        work_path: &Path,
        pattern: &str,
        format_id: u8,
    ) -> Result<Self, CacheError> {
        let pending = list_sources(dir, pattern)?;
        let count = u32::try_from(pending.len()).map_err(|_| CacheError::Malformed {
            path: work_path.to_path_buf(),
            reason: format!("{} source files exceed the record limit", pending.len()),
        })?;

        let file = File::create(work_path).map_err(|e| CacheError::io(work_path, e))?;
        let mut writer = BufWriter::new(file);
        let header = frame::FileHeader { format_id, count };
        if let Err(e) = frame::write_file_header(&mut writer, &header) {
            drop(writer);
            remove_file_best_effort(work_path, "start.header");
            return Err(CacheError::io(work_path, e));
        }

        Ok(Self {
            pending,
            work_path: work_path.to_path_buf(),
            writer: Some(Box::new(writer)),
            next: 0,
            written: 0,
            write_failed: false,
        })
    }

    fn append<C: Codec>(
        &mut self,
        index: usize,
        name: &str,
        codec: &C,
    ) -> Result<Vec<u8>, CacheError> {
        if index >= self.pending.len() {
            return Err(CacheError::NotFound { index });
        }
        if index != self.next {
            return Err(CacheError::OutOfOrder {
                expected: self.next,
                requested: index,
            });
        }
        self.next += 1;

        let raw = self.pending[index].read()?;
        let compressed = codec.compress(&raw)?;
        let checksum = ContentHash::from_bytes(&raw);

        let persisted = match frame::encode_record(name, raw.len(), &checksum, &compressed) {
            Ok(record) => self.persist(&record),
            Err(err) => {
                tracing::warn!(
                    target = "fcz.cache",
                    name,
                    error = ?err,
                    "cannot frame cache record"
                );
                false
            }
        };
        if persisted {
            self.written += 1;
            tracing::debug!(
                target = "fcz.cache",
                name,
                raw_len = raw.len(),
                compressed_len = compressed.len(),
                "appended cache record"
            );
        } else {
            self.write_failed = true;
        }

        Ok(raw)
    }

    fn persist(&mut self, record: &[u8]) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        match writer.write_all(record) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target = "fcz.cache",
                    path = %self.work_path.display(),
                    error = %err,
                    "cache record write failed, this build will not be committed"
                );
                self.writer = None;
                false
            }
        }
    }

    fn commit(self, cache_path: &Path, declared: usize) -> (usize, bool) {
        let Builder {
            pending,
            work_path,
            writer,
            written,
            mut write_failed,
            ..
        } = self;
        drop(pending);

        if let Some(mut writer) = writer {
            if let Err(err) = writer.flush() {
                tracing::warn!(
                    target = "fcz.cache",
                    path = %work_path.display(),
                    error = %err,
                    "failed to flush cache file"
                );
                write_failed = true;
            }
        }

        if write_failed || written != declared {
            tracing::warn!(
                target = "fcz.cache",
                path = %work_path.display(),
                written,
                declared,
                "discarding incomplete cache build"
            );
            remove_file_best_effort(&work_path, "finish.incomplete");
            return (written, false);
        }

        match std::fs::rename(&work_path, cache_path) {
            Ok(()) => {
                tracing::info!(
                    target = "fcz.cache",
                    path = %cache_path.display(),
                    records = written,
                    "committed cache file"
                );
                (written, true)
            }
            Err(err) => {
                tracing::warn!(
                    target = "fcz.cache",
                    path = %cache_path.display(),
                    error = %err,
                    "failed to move cache file into place"
                );
                remove_file_best_effort(&work_path, "finish.rename");
                (written, false)
            }
        }
    }
}

/// Where the replay cursor sits within the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Name,
    Payload,
}

/// Replay-side state: a sequential reader over the cache file.
struct Replayer {
    reader: BufReader<File>,
    next: usize,
    position: Position,
    records_read: usize,
    poisoned: bool,
}

impl Replayer {
    /// Opens `path` and reads its header. Returns `None` after deleting a file
    /// whose header is unreadable or was written by a codec other than
    /// `format_id`, so the caller can rebuild.
    fn open(path: &Path, format_id: u8) -> Result<Option<(usize, Self)>, CacheError> {
        let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
        let mut reader = BufReader::new(file);
        match frame::read_file_header(&mut reader) {
            Ok(header) if header.format_id != format_id => {
                tracing::warn!(
                    target = "fcz.cache",
                    path = %path.display(),
                    found = header.format_id,
                    expected = format_id,
                    "cache file written with another compression format, rebuilding"
                );
                drop(reader);
                remove_file_best_effort(path, "open.format");
                Ok(None)
            }
            Ok(header) => Ok(Some((
                header.count as usize,
                Self {
                    reader,
                    next: 0,
                    position: Position::Name,
                    records_read: 0,
                    poisoned: false,
                },
            ))),
            Err(FrameError::Io(e)) => Err(CacheError::io(path, e)),
            Err(err) => {
                tracing::warn!(
                    target = "fcz.cache",
                    path = %path.display(),
                    error = ?err,
                    "cache file header unreadable, rebuilding"
                );
                drop(reader);
                remove_file_best_effort(path, "open.header");
                Ok(None)
            }
        }
    }

    fn next_name(
        &mut self,
        index: usize,
        declared: usize,
        path: &Path,
    ) -> Result<String, CacheError> {
        self.check_usable(path)?;
        match self.position {
            Position::Name if index == self.next => {}
            Position::Payload if index == self.next + 1 => {
                if let Err(err) = self.skip_payload(path) {
                    tracing::debug!(
                        target = "fcz.cache",
                        index = index - 1,
                        error = %err,
                        "failed to skip unread cache payload"
                    );
                    self.check_usable(path)?;
                }
            }
            Position::Name => {
                return Err(CacheError::OutOfOrder {
                    expected: self.next,
                    requested: index,
                })
            }
            Position::Payload => {
                return Err(CacheError::OutOfOrder {
                    expected: self.next + 1,
                    requested: index,
                })
            }
        }
        self.read_name(index, declared, path)
    }

    fn next_content<C: Codec>(
        &mut self,
        index: usize,
        declared: usize,
        path: &Path,
        codec: &C,
    ) -> Result<Vec<u8>, CacheError> {
        self.check_usable(path)?;
        if index != self.next {
            return Err(CacheError::OutOfOrder {
                expected: self.next,
                requested: index,
            });
        }
        if self.position == Position::Name {
            self.read_name(index, declared, path)?;
        }

        let header = match frame::read_payload_header(&mut self.reader) {
            Ok(header) => header,
            Err(err) => return Err(self.fail(err, index, path)),
        };
        let compressed = match frame::read_payload(&mut self.reader, header.compressed_len) {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(err, index, path)),
        };
        self.advance(index);
        self.records_read += 1;

        let raw = codec.decompress(&compressed, header.raw_len as usize)?;
        if !header.checksum.verify(&raw) {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                index,
            });
        }
        Ok(raw)
    }

    fn read_name(
        &mut self,
        index: usize,
        declared: usize,
        path: &Path,
    ) -> Result<String, CacheError> {
        if index >= declared {
            return Err(CacheError::Exhausted { index });
        }
        match frame::read_name(&mut self.reader) {
            Ok(name) => {
                self.position = Position::Payload;
                Ok(name)
            }
            Err(FrameError::Eof) => {
                tracing::warn!(
                    target = "fcz.cache",
                    path = %path.display(),
                    index,
                    declared,
                    "cache file ends before its declared record count"
                );
                Err(self.fail(FrameError::Eof, index, path))
            }
            Err(err) => Err(self.fail(err, index, path)),
        }
    }

    fn skip_payload(&mut self, path: &Path) -> Result<(), CacheError> {
        let index = self.next;
        let header = match frame::read_payload_header(&mut self.reader) {
            Ok(header) => header,
            Err(err) => return Err(self.fail(err, index, path)),
        };
        if let Err(err) = frame::skip_payload(&mut self.reader, header.compressed_len) {
            return Err(self.fail(err, index, path));
        }
        self.advance(index);
        Ok(())
    }

    fn advance(&mut self, index: usize) {
        self.next = index + 1;
        self.position = Position::Name;
    }

    /// Moves past the failed record and maps the frame error. Errors that
    /// leave the stream misaligned poison the replay.
    fn fail(&mut self, err: FrameError, index: usize, path: &Path) -> CacheError {
        self.advance(index);
        match err {
            FrameError::Eof => CacheError::Exhausted { index },
            FrameError::Truncated => CacheError::Malformed {
                path: path.to_path_buf(),
                reason: format!("record {index} is truncated"),
            },
            FrameError::Invalid(reason) => {
                self.poisoned = true;
                CacheError::Malformed {
                    path: path.to_path_buf(),
                    reason: format!("record {index}: {reason}"),
                }
            }
            FrameError::Io(source) => {
                self.poisoned = true;
                CacheError::io(path, source)
            }
        }
    }

    fn check_usable(&self, path: &Path) -> Result<(), CacheError> {
        if self.poisoned {
            return Err(CacheError::Malformed {
                path: path.to_path_buf(),
                reason: "replay stopped after an earlier framing error".to_string(),
            });
        }
        Ok(())
    }
}
