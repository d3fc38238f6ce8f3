// =============================================================================
// TickChunk — in-memory batch of encoded records for one symbol and one date
// =============================================================================

use chrono::NaiveDate;

use crate::error::CodecError;
use crate::market_data::TickRecord;
use crate::storage::codec::{encode, RECORD_BYTES};

/// Default number of ticks per chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 1000;

/// Upper bound on ticks per chunk; larger requests are clamped.
pub const MAX_CHUNK_CAPACITY: usize = 1_000_000;

/// Append-only buffer of 16-byte records sharing one symbol and base date.
#[derive(Debug, Clone)]
pub struct TickChunk {
    symbol: String,
    base_date: NaiveDate,
    capacity: usize,
    buf: Vec<u8>,
}

impl TickChunk {
    pub fn new(symbol: impl Into<String>, base_date: NaiveDate, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CHUNK_CAPACITY);
        Self {
            symbol: symbol.into(),
            base_date,
            capacity,
            buf: Vec::with_capacity(capacity * RECORD_BYTES),
        }
    }

    /// Encode and append `record`.
    ///
    /// Returns `Ok(false)` without appending when the chunk is already full,
    /// and the codec error when the record does not fit the layout; in both
    /// cases the chunk is unchanged.
    pub fn push(&mut self, record: &TickRecord) -> Result<bool, CodecError> {
        if self.is_full() {
            return Ok(false);
        }
        let bytes = encode(record, self.base_date)?;
        self.buf.extend_from_slice(&bytes);
        Ok(true)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn base_date(&self) -> NaiveDate {
        self.base_date
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.buf.len() / RECORD_BYTES
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The concatenated records, `16 × count` bytes.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Compressed size as a percentage of the raw size.
    pub fn compression_ratio(&self, compressed_len: usize) -> f64 {
        if self.buf.is_empty() {
            return 0.0;
        }
        compressed_len as f64 / self.buf.len() as f64 * 100.0
    }
}

impl std::fmt::Display for TickChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TickChunk[{} {} count={}/{}, usage={:.1}%, bytes={}]",
            self.symbol,
            self.base_date,
            self.count(),
            self.capacity,
            self.count() as f64 * 100.0 / self.capacity as f64,
            self.buf.len()
        )
    }
}
