//! On-disk framing of a cache file.
//!
//! ```text
//! header : magic "FCZ\0" | u8 codec format id | u32 declared count
//! record : u16 name len | name (UTF-8) | u32 compressed len | u32 raw len
//!          | 16-byte XXH3-128 of the raw bytes | compressed payload
//! ```
//!
//! All integers are little-endian. Records follow each other with no padding.

use std::io::{self, Read, Write};

use fcz_common::ContentHash;

/// Magic bytes identifying a cache file.
const CACHE_MAGIC: [u8; 4] = *b"FCZ\0";

/// Size of the file header in bytes.
pub(crate) const FILE_HEADER_LEN: usize = 4 + 1 + 4;

/// Upper bound for a compressed or raw payload length read from disk.
///
/// A damaged length field must degrade to a malformed record, not an attempt
/// to allocate gigabytes.
pub const MAX_PAYLOAD_BYTES: u32 = 256 * 1024 * 1024;

/// Reasons a frame could not be read.
#[derive(Debug)]
pub(crate) enum FrameError {
    /// The stream ended cleanly before the first byte of the frame.
    Eof,
    /// The stream ended partway through the frame.
    Truncated,
    /// The frame was read but its contents are invalid.
    Invalid(String),
    /// The underlying reader failed.
    Io(io::Error),
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        FrameError::Io(err)
    }
}

/// Fields of the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileHeader {
    /// Identifies the codec that compressed every payload in the file.
    pub format_id: u8,
    pub count: u32,
}

/// Length and checksum fields that precede a record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PayloadHeader {
    pub compressed_len: u32,
    pub raw_len: u32,
    pub checksum: ContentHash,
}

/// Writes the file header.
pub(crate) fn write_file_header<W: Write>(writer: &mut W, header: &FileHeader) -> io::Result<()> {
    let mut buf = [0u8; FILE_HEADER_LEN];
    buf[..4].copy_from_slice(&CACHE_MAGIC);
    buf[4] = header.format_id;
    buf[5..].copy_from_slice(&header.count.to_le_bytes());
    writer.write_all(&buf)
}

/// Reads the file header.
pub(crate) fn read_file_header<R: Read>(reader: &mut R) -> Result<FileHeader, FrameError> {
    let mut buf = [0u8; FILE_HEADER_LEN];
    read_frame_part(reader, &mut buf, true)?;
    if buf[..4] != CACHE_MAGIC {
        return Err(FrameError::Invalid("bad magic bytes".to_string()));
    }
    Ok(FileHeader {
        format_id: buf[4],
        count: u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]),
    })
}

/// Encodes a complete record so it can be appended with a single write.
pub(crate) fn encode_record(
    name: &str,
    raw_len: usize,
    checksum: &ContentHash,
    compressed: &[u8],
) -> Result<Vec<u8>, FrameError> {
    let name_len = u16::try_from(name.len())
        .map_err(|_| FrameError::Invalid(format!("name of {} bytes is too long", name.len())))?;
    let compressed_len = checked_len(compressed.len(), "compressed")?;
    let raw_len = checked_len(raw_len, "raw")?;

    let mut out =
        Vec::with_capacity(2 + name.len() + 8 + ContentHash::LEN + compressed.len());
    out.extend_from_slice(&name_len.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&compressed_len.to_le_bytes());
    out.extend_from_slice(&raw_len.to_le_bytes());
    out.extend_from_slice(checksum.as_raw());
    out.extend_from_slice(compressed);
    Ok(out)
}

fn checked_len(len: usize, what: &str) -> Result<u32, FrameError> {
    match u32::try_from(len) {
        Ok(len) if len <= MAX_PAYLOAD_BYTES => Ok(len),
        _ => Err(FrameError::Invalid(format!(
            "{what} length {len} exceeds {MAX_PAYLOAD_BYTES}"
        ))),
    }
}

/// Reads the name field that starts a record.
///
/// Returns [`FrameError::Eof`] when the stream ends exactly at a record boundary.
pub(crate) fn read_name<R: Read>(reader: &mut R) -> Result<String, FrameError> {
    let mut len = [0u8; 2];
    read_frame_part(reader, &mut len, true)?;
    let mut name = vec![0u8; u16::from_le_bytes(len) as usize];
    read_frame_part(reader, &mut name, false)?;
    String::from_utf8(name).map_err(|_| FrameError::Invalid("name is not UTF-8".to_string()))
}

/// Reads the length and checksum fields that follow a record's name.
pub(crate) fn read_payload_header<R: Read>(reader: &mut R) -> Result<PayloadHeader, FrameError> {
    let mut buf = [0u8; 8 + ContentHash::LEN];
    read_frame_part(reader, &mut buf, false)?;
    let compressed_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let raw_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    for (what, len) in [("compressed", compressed_len), ("raw", raw_len)] {
        if len > MAX_PAYLOAD_BYTES {
            return Err(FrameError::Invalid(format!(
                "{what} length {len} exceeds {MAX_PAYLOAD_BYTES}"
            )));
        }
    }
    let mut checksum = [0u8; ContentHash::LEN];
    checksum.copy_from_slice(&buf[8..]);
    Ok(PayloadHeader {
        compressed_len,
        raw_len,
        checksum: ContentHash::from_raw(checksum),
    })
}

/// Reads exactly `len` payload bytes.
///
/// The buffer grows with the bytes actually present, so a damaged length on a
/// short file does not allocate the full declared size.
pub(crate) fn read_payload<R: Read>(reader: &mut R, len: u32) -> Result<Vec<u8>, FrameError> {
    let mut payload = Vec::new();
    reader
        .by_ref()
        .take(u64::from(len))
        .read_to_end(&mut payload)?;
    if payload.len() != len as usize {
        return Err(FrameError::Truncated);
    }
    Ok(payload)
}

/// Consumes `len` payload bytes without keeping them.
pub(crate) fn skip_payload<R: Read>(reader: &mut R, len: u32) -> Result<(), FrameError> {
    let skipped = io::copy(&mut reader.by_ref().take(u64::from(len)), &mut io::sink())?;
    if skipped != u64::from(len) {
        return Err(FrameError::Truncated);
    }
    Ok(())
}

/// Fills `buf` completely. An empty read at a frame start is reported as
/// [`FrameError::Eof`], any other shortfall as [`FrameError::Truncated`].
fn read_frame_part<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    frame_start: bool,
) -> Result<(), FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    match filled {
        n if n == buf.len() => Ok(()),
        0 if frame_start => Err(FrameError::Eof),
        _ => Err(FrameError::Truncated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(name: &str, raw: &[u8], payload: &[u8]) -> Vec<u8> {
        encode_record(name, raw.len(), &ContentHash::from_bytes(raw), payload).unwrap()
    }

    #[test]
    fn header_reads_back_format_and_count() {
        let header = FileHeader {
            format_id: 2,
            count: 3,
        };
        let mut buf = Vec::new();
        write_file_header(&mut buf, &header).unwrap();
        assert_eq!(buf.len(), FILE_HEADER_LEN);
        assert_eq!(read_file_header(&mut Cursor::new(buf)).unwrap(), header);
    }

    #[test]
    fn header_with_bad_magic_is_invalid() {
        let bytes = b"3#\0\0\0\0\0\0\0".to_vec();
        let err = read_file_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, FrameError::Invalid(_)));
    }

    #[test]
    fn empty_file_header_is_eof() {
        let err = read_file_header(&mut Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, FrameError::Eof));
    }

    #[test]
    fn short_header_is_truncated() {
        let err = read_file_header(&mut Cursor::new(b"FCZ".to_vec())).unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[test]
    fn record_fields_read_in_sequence() {
        let mut buf = record("a.png", b"raw bytes", b"cmp");
        buf.extend(record("c.png", b"more", b"zz"));
        let mut cursor = Cursor::new(buf);

        assert_eq!(read_name(&mut cursor).unwrap(), "a.png");
        let header = read_payload_header(&mut cursor).unwrap();
        assert_eq!(header.compressed_len, 3);
        assert_eq!(header.raw_len, 9);
        assert_eq!(header.checksum, ContentHash::from_bytes(b"raw bytes"));
        assert_eq!(read_payload(&mut cursor, header.compressed_len).unwrap(), b"cmp");

        assert_eq!(read_name(&mut cursor).unwrap(), "c.png");
        let header = read_payload_header(&mut cursor).unwrap();
        skip_payload(&mut cursor, header.compressed_len).unwrap();
        assert!(matches!(read_name(&mut cursor), Err(FrameError::Eof)));
    }

    #[test]
    fn truncated_payload_is_detected() {
        let mut buf = record("a.png", b"raw", b"payload");
        buf.truncate(buf.len() - 3);
        let mut cursor = Cursor::new(buf);

        read_name(&mut cursor).unwrap();
        let header = read_payload_header(&mut cursor).unwrap();
        let err = read_payload(&mut cursor, header.compressed_len).unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[test]
    fn damaged_length_on_short_stream_is_truncated() {
        let mut cursor = Cursor::new(vec![7u8; 16]);
        let err = read_payload(&mut cursor, MAX_PAYLOAD_BYTES).unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[test]
    fn truncated_skip_is_detected() {
        let mut buf = record("a.png", b"raw", b"payload");
        buf.truncate(buf.len() - 1);
        let mut cursor = Cursor::new(buf);

        read_name(&mut cursor).unwrap();
        let header = read_payload_header(&mut cursor).unwrap();
        assert!(matches!(
            skip_payload(&mut cursor, header.compressed_len),
            Err(FrameError::Truncated)
        ));
    }

    #[test]
    fn truncated_name_is_not_eof() {
        let mut buf = record("sprites.png", b"raw", b"p");
        buf.truncate(4);
        let err = read_name(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[test]
    fn oversized_length_is_invalid() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_PAYLOAD_BYTES + 1).to_le_bytes());
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; ContentHash::LEN]);
        let err = read_payload_header(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, FrameError::Invalid(_)));
    }

    #[test]
    fn non_utf8_name_is_invalid() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&[0xff, 0xfe]);
        let err = read_name(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, FrameError::Invalid(_)));
    }

    #[test]
    fn overlong_name_is_rejected_on_encode() {
        let name = "n".repeat(u16::MAX as usize + 1);
        let err = encode_record(&name, 0, &ContentHash::from_bytes(&[]), &[]).unwrap_err();
        assert!(matches!(err, FrameError::Invalid(_)));
    }
}
