// =============================================================================
// Compressor capability
// =============================================================================
//
// Decompression always takes the expected raw size from chunk metadata and
// fails on any mismatch, so a truncated or padded stream can never produce a
// shorter or longer record list.
// =============================================================================

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::CompressionError;

/// Initial output buffer, as a multiple of the compressed size.
const INITIAL_INFLATE_RATIO: usize = 8;

/// Byte-oriented block compressor injected into the chunk writer and reader.
pub trait Compressor: Send + Sync {
    /// Codec name recorded in chunk metadata.
    fn name(&self) -> &'static str;

    /// Compression level recorded in chunk metadata, if meaningful.
    fn level(&self) -> Option<u32> {
        None
    }

    /// Whether blobs produced by this compressor differ from the raw bytes.
    fn is_compressing(&self) -> bool {
        true
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CompressionError>;

    /// Restore exactly `raw_len` bytes from `blob`.
    fn decompress(&self, blob: &[u8], raw_len: usize) -> Result<Vec<u8>, CompressionError>;
}

// ---------------------------------------------------------------------------
// zlib
// ---------------------------------------------------------------------------

/// zlib (deflate) via flate2.
#[derive(Debug, Clone, Copy)]
pub struct ZlibCompressor {
    level: u32,
}

impl ZlibCompressor {
    /// `level` is clamped to flate2's 0..=9.
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::new(6)
    }
}

impl Compressor for ZlibCompressor {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn level(&self) -> Option<u32> {
        Some(self.level)
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::new(self.level));
        encoder.write_all(raw).map_err(CompressionError::Compress)?;
        encoder.finish().map_err(CompressionError::Compress)
    }

    fn decompress(&self, blob: &[u8], raw_len: usize) -> Result<Vec<u8>, CompressionError> {
        // Read one byte past the target so oversized streams are detected
        // without inflating them completely.
        // `raw_len` comes from stored metadata, so the buffer grows from the
        // blob size rather than trusting it.
        let mut decoder = ZlibDecoder::new(blob).take((raw_len as u64).saturating_add(1));
        let initial = raw_len.min(blob.len().saturating_mul(INITIAL_INFLATE_RATIO));
        let mut raw = Vec::with_capacity(initial);
        decoder.read_to_end(&mut raw).map_err(CompressionError::Stream)?;

        if raw.len() != raw_len {
            return Err(CompressionError::SizeMismatch {
                expected: raw_len,
                actual: raw.len(),
            });
        }
        Ok(raw)
    }
}

// ---------------------------------------------------------------------------
// Passthrough
// ---------------------------------------------------------------------------

/// Stores raw bytes unchanged; used for chunks whose metadata says
/// `compressed=false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Compressor for Passthrough {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_compressing(&self) -> bool {
        false
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, blob: &[u8], raw_len: usize) -> Result<Vec<u8>, CompressionError> {
        if blob.len() != raw_len {
            return Err(CompressionError::SizeMismatch {
                expected: raw_len,
                actual: blob.len(),
            });
        }
        Ok(blob.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> Vec<u8> {
        (0..4096u32).flat_map(|i| ((i % 37) as u16).to_le_bytes()).collect()
    }

    #[test]
    fn zlib_roundtrip() {
        let zlib = ZlibCompressor::default();
        let raw = sample_raw();
        let blob = zlib.compress(&raw).unwrap();
        assert!(blob.len() < raw.len());
        assert_eq!(zlib.decompress(&blob, raw.len()).unwrap(), raw);
    }

    #[test]
    fn zlib_detects_size_mismatch_both_ways() {
        let zlib = ZlibCompressor::new(3);
        let raw = sample_raw();
        let blob = zlib.compress(&raw).unwrap();

        match zlib.decompress(&blob, raw.len() + 16) {
            Err(CompressionError::SizeMismatch { expected, actual }) => {
                assert_eq!(expected, raw.len() + 16);
                assert_eq!(actual, raw.len());
            }
            other => panic!("expected size mismatch, got {other:?}"),
        }
        assert!(matches!(
            zlib.decompress(&blob, raw.len() - 16),
            Err(CompressionError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn zlib_rejects_garbage() {
        let zlib = ZlibCompressor::default();
        assert!(zlib.decompress(b"definitely not zlib", 32).is_err());
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(ZlibCompressor::new(42).level(), Some(9));
    }

    #[test]
    fn passthrough_checks_length() {
        let raw = sample_raw();
        let blob = Passthrough.compress(&raw).unwrap();
        assert_eq!(blob, raw);
        assert_eq!(Passthrough.decompress(&blob, raw.len()).unwrap(), raw);
        assert!(Passthrough.decompress(&blob, raw.len() - 1).is_err());
        assert!(!Passthrough.is_compressing());
    }

    #[test]
    fn zlib_absurd_expected_size_is_a_mismatch_not_an_allocation() {
        let zlib = ZlibCompressor::default();
        let raw = sample_raw();
        let blob = zlib.compress(&raw).unwrap();
        match zlib.decompress(&blob, usize::MAX - 15) {
            Err(CompressionError::SizeMismatch { actual, .. }) => assert_eq!(actual, raw.len()),
            other => panic!("expected size mismatch, got {other:?}"),
        }
    }
}
