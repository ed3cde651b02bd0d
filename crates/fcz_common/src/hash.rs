//! Content hashing for cached record integrity.

use std::fmt;

/// XXH3-128 digest of a record's raw (uncompressed) bytes.
///
/// Written next to every cache record and checked after the payload is
/// decompressed on replay, so a record damaged on disk is rejected rather
/// than handed to the caller.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Width of the digest as stored on disk.
    pub const LEN: usize = 16;

    /// Digests `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(data).to_le_bytes())
    }

    /// Rebuilds a digest from the bytes stored in a record.
    pub fn from_raw(raw: [u8; 16]) -> Self {
        Self(raw)
    }

    /// Bytes to store in a record, little-endian.
    pub fn as_raw(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns `true` if `data` digests to this value.
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::from_bytes(data) == *self
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentHash(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        f.write_str("..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_digest_verifies_its_payload() {
        let raw = b"sprite sheet pixels";
        let stored = ContentHash::from_raw(*ContentHash::from_bytes(raw).as_raw());
        assert!(stored.verify(raw));
    }

    #[test]
    fn single_bit_flip_fails_verification() {
        let mut raw = vec![0x55u8; 512];
        let stored = ContentHash::from_bytes(&raw);
        raw[300] ^= 0x01;
        assert!(!stored.verify(&raw));
    }

    #[test]
    fn truncated_payload_fails_verification() {
        let raw = b"level geometry";
        let stored = ContentHash::from_bytes(raw);
        assert!(!stored.verify(&raw[..raw.len() - 1]));
    }

    #[test]
    fn empty_record_differs_from_zero_byte_record() {
        let empty = ContentHash::from_bytes(&[]);
        assert!(empty.verify(&[]));
        assert!(!empty.verify(&[0]));
    }

    #[test]
    fn debug_shows_leading_bytes() {
        let h = ContentHash::from_raw([0xab; 16]);
        assert_eq!(format!("{h:?}"), "ContentHash(abababab..)");
    }
}
