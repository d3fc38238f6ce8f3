// =============================================================================
// Error taxonomy
// =============================================================================
//
// Per-record errors (ValidationError, CodecError::OutOfRange) are recoverable:
// the tick is skipped and ingestion continues.  Per-chunk errors (ChunkError)
// abort the read or write of that one chunk and never yield a partial record
// sequence.
// =============================================================================

use thiserror::Error;

/// Why a raw tick was refused by the validator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("symbol code is missing or empty")]
    MissingSymbol,

    #[error("time field is missing")]
    MissingTime,

    #[error("time field {0:?} is not six digits (HHMMSS)")]
    MalformedTime(String),

    #[error("time field {0:?} is not a real time of day")]
    UnparsableTime(String),

    #[error("{0} price is missing")]
    MissingPrice(&'static str),

    #[error("{field} price {value} is out of range")]
    PriceOutOfRange { field: &'static str, value: i64 },

    #[error("volume is missing")]
    MissingVolume,

    #[error("volume {0} is not positive")]
    NonPositiveVolume(i64),

    #[error("change rate is missing")]
    MissingChangeRate,

    #[error("change rate {0} is outside [-100, 100]")]
    ChangeRateOutOfRange(f64),

    #[error("previous-day value is missing")]
    MissingPreviousDay,
}

/// Failures of the 16-byte record codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A field does not fit its fixed-width slot. Raised by encode; the
    /// value is never truncated.
    #[error("{field} value {value} is outside the encodable range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("record decodes to implausible time offset {0}s")]
    ImplausibleTime(u32),

    #[error("record carries a negative-zero previous-day value")]
    NegativeZero,
}

/// Failures of the injected compressor.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),

    #[error("invalid compressed stream: {0}")]
    Stream(#[source] std::io::Error),

    #[error("decompressed size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("raw checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Failures of the key-value chunk store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Chunks are write-once; a second write under the same key is refused.
    #[error("{0} already exists")]
    AlreadyExists(String),
}

/// Chunk-granular failures surfaced by the writer and reader.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk {0} not found")]
    ChunkNotFound(String),

    #[error("chunk {chunk_id} has corrupt metadata: {reason}")]
    CorruptMetadata { chunk_id: String, reason: String },

    #[error("chunk {chunk_id} failed to compress: {source}")]
    Compression {
        chunk_id: String,
        #[source]
        source: CompressionError,
    },

    #[error("chunk {chunk_id} failed to decompress: {source}")]
    Decompression {
        chunk_id: String,
        #[source]
        source: CompressionError,
    },

    #[error("chunk {chunk_id} record {index} is undecodable: {source}")]
    Decode {
        chunk_id: String,
        index: usize,
        #[source]
        source: CodecError,
    },

    #[error("chunk {0} has no encodable records")]
    EmptyChunk(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChunkError {
    pub(crate) fn corrupt(chunk_id: &str, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            chunk_id: chunk_id.to_string(),
            reason: reason.into(),
        }
    }
}
