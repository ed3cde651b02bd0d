//! Compression of record payloads.
//!
//! The session only needs a byte-array transform with a known output length,
//! captured by the [`Codec`] trait. [`FlateCodec`] is the `flate2`-backed
//! implementation used by default.

use std::io::{Read, Write};

use fcz_config::{CompressionConfig, CompressionFormat, DEFAULT_COMPRESSION_LEVEL};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::error::CacheError;

/// A byte-array compressor used to build and replay cache records.
pub trait Codec {
    /// Identifies the payload format in the cache file header. A cache file
    /// written under a different id cannot be replayed by this codec.
    fn format_id(&self) -> u8;

    /// Compresses `raw` into a self-contained payload.
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CacheError>;

    /// Decompresses `compressed`, which must expand to exactly `raw_len` bytes.
    fn decompress(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>, CacheError>;
}

/// Deflate-family codec backed by `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct FlateCodec {
    format: CompressionFormat,
    level: Compression,
}

impl FlateCodec {
    /// Creates a codec for the given stream format and level (`0..=9`).
    pub fn new(format: CompressionFormat, level: u32) -> Self {
        Self {
            format,
            level: Compression::new(level),
        }
    }

    /// Creates a codec from the `[compression]` settings table.
    pub fn from_config(config: &CompressionConfig) -> Self {
        Self::new(config.format, config.level)
    }
}

impl Default for FlateCodec {
    fn default() -> Self {
        Self::new(CompressionFormat::Zlib, DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Codec for FlateCodec {
    fn format_id(&self) -> u8 {
        match self.format {
            CompressionFormat::Zlib => 1,
            CompressionFormat::Gzip => 2,
            CompressionFormat::Deflate => 3,
        }
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CacheError> {
        let out = match self.format {
            CompressionFormat::Zlib => encode(ZlibEncoder::new(Vec::new(), self.level), raw),
            CompressionFormat::Gzip => encode(GzEncoder::new(Vec::new(), self.level), raw),
            CompressionFormat::Deflate => {
                encode(DeflateEncoder::new(Vec::new(), self.level), raw)
            }
        };
        out.map_err(|e| CacheError::Transform {
            reason: format!("compression failed: {e}"),
        })
    }

    fn decompress(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>, CacheError> {
        match self.format {
            CompressionFormat::Zlib => decode(ZlibDecoder::new(compressed), raw_len),
            CompressionFormat::Gzip => decode(GzDecoder::new(compressed), raw_len),
            CompressionFormat::Deflate => decode(DeflateDecoder::new(compressed), raw_len),
        }
    }
}

/// Common shape of the `flate2` write-side encoders.
trait FinishEncoder: Write {
    fn finish_into(self) -> std::io::Result<Vec<u8>>;
}

impl FinishEncoder for ZlibEncoder<Vec<u8>> {
    fn finish_into(self) -> std::io::Result<Vec<u8>> {
        self.finish()
    }
}

impl FinishEncoder for GzEncoder<Vec<u8>> {
    fn finish_into(self) -> std::io::Result<Vec<u8>> {
        self.finish()
    }
}

impl FinishEncoder for DeflateEncoder<Vec<u8>> {
    fn finish_into(self) -> std::io::Result<Vec<u8>> {
        self.finish()
    }
}

fn encode<E: FinishEncoder>(mut encoder: E, raw: &[u8]) -> std::io::Result<Vec<u8>> {
    encoder.write_all(raw)?;
    encoder.finish_into()
}

/// Inflates at most `raw_len + 1` bytes so an oversized stream is caught
/// without reading it to the end.
fn decode<R: Read>(decoder: R, raw_len: usize) -> Result<Vec<u8>, CacheError> {
    let mut out = Vec::with_capacity(raw_len);
    decoder
        .take(raw_len as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Transform {
            reason: format!("decompression failed: {e}"),
        })?;
    if out.len() != raw_len {
        return Err(CacheError::Transform {
            reason: format!(
                "decompressed {} bytes, record declares {raw_len}",
                out.len()
            ),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096).map(|i| (i % 17) as u8).collect()
    }

    #[test]
    fn every_format_restores_input() {
        let data = sample();
        for format in [
            CompressionFormat::Zlib,
            CompressionFormat::Gzip,
            CompressionFormat::Deflate,
        ] {
            let codec = FlateCodec::new(format, 6);
            let compressed = codec.compress(&data).unwrap();
            assert!(compressed.len() < data.len(), "{format:?} did not shrink");
            assert_eq!(codec.decompress(&compressed, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn empty_input() {
        let codec = FlateCodec::default();
        let compressed = codec.compress(&[]).unwrap();
        assert!(codec.decompress(&compressed, 0).unwrap().is_empty());
    }

    #[test]
    fn level_zero_stores() {
        let codec = FlateCodec::new(CompressionFormat::Zlib, 0);
        let data = sample();
        let compressed = codec.compress(&data).unwrap();
        assert!(compressed.len() >= data.len());
        assert_eq!(codec.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn wrong_declared_length_is_transform_error() {
        let codec = FlateCodec::default();
        let data = sample();
        let compressed = codec.compress(&data).unwrap();

        let short = codec.decompress(&compressed, data.len() - 1).unwrap_err();
        assert!(matches!(short, CacheError::Transform { .. }));
        let long = codec.decompress(&compressed, data.len() + 10).unwrap_err();
        assert!(matches!(long, CacheError::Transform { .. }));
    }

    #[test]
    fn garbage_is_transform_error() {
        let codec = FlateCodec::default();
        let err = codec.decompress(b"definitely not zlib", 32).unwrap_err();
        assert!(matches!(err, CacheError::Transform { .. }));
    }

    #[test]
    fn format_ids_differ_per_format_not_level() {
        let zlib = FlateCodec::new(CompressionFormat::Zlib, 1);
        let gzip = FlateCodec::new(CompressionFormat::Gzip, 1);
        let deflate = FlateCodec::new(CompressionFormat::Deflate, 1);
        assert_ne!(zlib.format_id(), gzip.format_id());
        assert_ne!(gzip.format_id(), deflate.format_id());
        assert_ne!(zlib.format_id(), deflate.format_id());
        assert_eq!(
            zlib.format_id(),
            FlateCodec::new(CompressionFormat::Zlib, 9).format_id()
        );
    }

    #[test]
    fn from_config_uses_format() {
        let config = CompressionConfig {
            format: CompressionFormat::Gzip,
            level: 9,
        };
        let codec = FlateCodec::from_config(&config);
        let compressed = codec.compress(b"hello").unwrap();
        // gzip magic
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
    }
}
