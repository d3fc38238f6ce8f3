// =============================================================================
// Chunk Writer — encode, compress, persist, index
// =============================================================================

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{ChunkError, CodecError};
use crate::market_data::TickRecord;
use crate::storage::chunk::TickChunk;
use crate::storage::compression::Compressor;
use crate::storage::meta::{ChunkMeta, FORMAT_VERSION};
use crate::storage::store::{ChunkStore, KeySpace};

/// Result of a successful write.
#[derive(Debug)]
pub struct WriteOutcome {
    pub chunk_id: String,
    pub meta: ChunkMeta,
    pub blob: Vec<u8>,
    /// Records skipped because a field did not fit the layout, by input index.
    pub rejected: Vec<(usize, CodecError)>,
}

impl WriteOutcome {
    /// Compressed size as a percentage of the raw size.
    pub fn compression_ratio(&self) -> f64 {
        if self.meta.raw_bytes == 0 {
            return 0.0;
        }
        self.blob.len() as f64 / self.meta.raw_bytes as f64 * 100.0
    }
}

pub struct ChunkWriter {
    store: Arc<dyn ChunkStore>,
    compressor: Arc<dyn Compressor>,
    keys: KeySpace,
}

impl ChunkWriter {
    pub fn new(store: Arc<dyn ChunkStore>, compressor: Arc<dyn Compressor>, keys: KeySpace) -> Self {
        Self {
            store,
            compressor,
            keys,
        }
    }

    /// Encode `records` against `base_date` and persist them as chunk
    /// `chunk_id`.
    ///
    /// Records that do not fit the 16-byte layout are skipped and listed in
    /// [`WriteOutcome::rejected`]; the rest keep their relative order. Fails
    /// with [`ChunkError::EmptyChunk`] when nothing is left to store.
    pub fn write(
        &self,
        chunk_id: &str,
        records: &[TickRecord],
        base_date: NaiveDate,
    ) -> Result<WriteOutcome, ChunkError> {
        let symbol = records.first().map(|r| r.symbol.as_str()).unwrap_or_default();
        let single_symbol = records.iter().all(|r| r.symbol == symbol);

        let mut chunk = TickChunk::new(symbol, base_date, records.len());
        let mut rejected = Vec::new();
        for (index, record) in records.iter().enumerate() {
            if let Err(e) = chunk.push(record) {
                warn!(chunk_id = %chunk_id, index, error = %e, "record rejected from chunk");
                rejected.push((index, e));
            }
        }

        let symbol = single_symbol.then_some(symbol);
        let mut outcome = self.store_raw(chunk_id, symbol, base_date, chunk.count(), chunk.raw_bytes())?;
        outcome.rejected = rejected;
        Ok(outcome)
    }

    /// Persist an already-encoded chunk.
    pub fn persist(&self, chunk_id: &str, chunk: &TickChunk) -> Result<WriteOutcome, ChunkError> {
        self.store_raw(
            chunk_id,
            Some(chunk.symbol()),
            chunk.base_date(),
            chunk.count(),
            chunk.raw_bytes(),
        )
    }

    fn store_raw(
        &self,
        chunk_id: &str,
        symbol: Option<&str>,
        base_date: NaiveDate,
        count: usize,
        raw: &[u8],
    ) -> Result<WriteOutcome, ChunkError> {
        if count == 0 {
            return Err(ChunkError::EmptyChunk(chunk_id.to_string()));
        }

        let blob = self
            .compressor
            .compress(raw)
            .map_err(|source| ChunkError::Compression {
                chunk_id: chunk_id.to_string(),
                source,
            })?;

        let symbol = symbol.filter(|s| !s.is_empty()).map(str::to_string);
        let meta = ChunkMeta {
            count,
            raw_bytes: raw.len(),
            base_date,
            compressed: self.compressor.is_compressing(),
            symbol: symbol.clone(),
            version: FORMAT_VERSION,
            codec: Some(self.compressor.name().to_string()),
            level: self.compressor.level(),
            checksum: Some(hex::encode(Sha256::digest(raw))),
            created_at: Some(Utc::now()),
        };

        self.store.put_chunk(
            &self.keys.meta_key(chunk_id),
            &meta.to_fields(),
            &self.keys.blob_key(chunk_id),
            &blob,
        )?;

        self.store.append_index(&self.keys.all_index_key(), chunk_id)?;
        if let Some(symbol) = &symbol {
            self.store
                .append_index(&self.keys.symbol_index_key(symbol), chunk_id)?;
        }

        let outcome = WriteOutcome {
            chunk_id: chunk_id.to_string(),
            meta,
            blob,
            rejected: Vec::new(),
        };
        info!(
            chunk_id = %chunk_id,
            symbol = symbol.as_deref().unwrap_or("-"),
            ticks = count,
            raw_bytes = raw.len(),
            blob_bytes = outcome.blob.len(),
            ratio_pct = outcome.compression_ratio(),
            "chunk written"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::compression::{Passthrough, ZlibCompressor};
    use crate::storage::store::MemoryChunkStore;
    use chrono::NaiveTime;

    fn chunk(ticks: u32) -> TickChunk {
        let date = NaiveDate::from_ymd_opt(2025, 8, 6).unwrap();
        let mut chunk = TickChunk::new("005930", date, 100);
        for i in 0..ticks {
            let record = TickRecord {
                symbol: "005930".into(),
                time: NaiveTime::from_hms_opt(9, 30, i).unwrap(),
                open: 51_000,
                high: 51_000,
                low: 51_000,
                close: 51_000,
                volume: 1,
                change_rate: 0.0,
                previous_day: 0,
                received_at: date.and_hms_opt(9, 30, i).unwrap(),
            };
            chunk.push(&record).unwrap();
        }
        chunk
    }

    #[test]
    fn persist_records_codec_and_checksum() {
        let store = Arc::new(MemoryChunkStore::new());
        let writer = ChunkWriter::new(store.clone(), Arc::new(ZlibCompressor::new(9)), KeySpace::default());

        let chunk = chunk(50);
        let outcome = writer.persist("c1", &chunk).unwrap();
        assert!(outcome.meta.compressed);
        assert_eq!(outcome.meta.codec.as_deref(), Some("zlib"));
        assert_eq!(outcome.meta.level, Some(9));
        assert_eq!(outcome.meta.raw_bytes, 800);
        assert_eq!(
            outcome.meta.checksum.as_deref(),
            Some(hex::encode(Sha256::digest(chunk.raw_bytes())).as_str())
        );
        // Fifty near-identical records compress well.
        assert!(outcome.compression_ratio() < 50.0);
        assert_eq!(store.get_blob("ticks:chunk:c1:blob").unwrap(), Some(outcome.blob));
    }

    #[test]
    fn passthrough_stores_raw_bytes() {
        let store = Arc::new(MemoryChunkStore::new());
        let writer = ChunkWriter::new(store.clone(), Arc::new(Passthrough), KeySpace::new("raw"));

        let chunk = chunk(2);
        let outcome = writer.persist("c1", &chunk).unwrap();
        assert!(!outcome.meta.compressed);
        assert_eq!(outcome.blob, chunk.raw_bytes());
        assert!(store.get_meta("raw:c1:meta").unwrap().is_some());
        assert_eq!(store.index_members("raws").unwrap(), vec!["c1"]);
        assert_eq!(store.index_members("raws:bySymbol:005930").unwrap(), vec!["c1"]);
    }

    #[test]
    fn empty_chunk_is_refused() {
        let store = Arc::new(MemoryChunkStore::new());
        let writer = ChunkWriter::new(store.clone(), Arc::new(Passthrough), KeySpace::default());
        assert!(matches!(writer.persist("c1", &chunk(0)), Err(ChunkError::EmptyChunk(_))));
        assert_eq!(store.chunk_count(), 0);
    }
}
