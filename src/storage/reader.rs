// =============================================================================
// Chunk Reader — fetch, decompress, verify, decode
// =============================================================================

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ChunkError, CompressionError};
use crate::storage::codec::{decode, TickSample, RECORD_BYTES};
use crate::storage::compression::{Compressor, Passthrough};
use crate::storage::meta::ChunkMeta;
use crate::storage::store::{ChunkStore, KeySpace};

pub struct ChunkReader {
    store: Arc<dyn ChunkStore>,
    compressor: Arc<dyn Compressor>,
    keys: KeySpace,
}

impl ChunkReader {
    pub fn new(store: Arc<dyn ChunkStore>, compressor: Arc<dyn Compressor>, keys: KeySpace) -> Self {
        Self {
            store,
            compressor,
            keys,
        }
    }

    /// Parsed metadata of `chunk_id`.
    pub fn read_meta(&self, chunk_id: &str) -> Result<ChunkMeta, ChunkError> {
        let fields = self
            .store
            .get_meta(&self.keys.meta_key(chunk_id))?
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ChunkError::ChunkNotFound(chunk_id.to_string()))?;
        ChunkMeta::from_fields(&fields).map_err(|reason| ChunkError::corrupt(chunk_id, reason))
    }

    /// Every record of `chunk_id`, in write order.
    ///
    /// Any failure aborts the whole chunk; a partial sequence is never
    /// returned.
    pub fn read(&self, chunk_id: &str) -> Result<Vec<TickSample>, ChunkError> {
        let meta = self.read_meta(chunk_id)?;

        let passthrough = Passthrough;
        let decompressor: &dyn Compressor = if meta.compressed {
            if let Some(codec) = meta.codec.as_deref() {
                if codec != self.compressor.name() {
                    return Err(ChunkError::corrupt(
                        chunk_id,
                        format!(
                            "chunk codec {codec:?} does not match reader codec {:?}",
                            self.compressor.name()
                        ),
                    ));
                }
            }
            self.compressor.as_ref()
        } else {
            &passthrough
        };

        let blob = self
            .store
            .get_blob(&self.keys.blob_key(chunk_id))?
            .ok_or_else(|| ChunkError::ChunkNotFound(chunk_id.to_string()))?;

        let raw = decompressor
            .decompress(&blob, meta.raw_bytes)
            .map_err(|source| ChunkError::Decompression {
                chunk_id: chunk_id.to_string(),
                source,
            })?;

        if let Some(expected) = &meta.checksum {
            let actual = hex::encode(Sha256::digest(&raw));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ChunkError::Decompression {
                    chunk_id: chunk_id.to_string(),
                    source: CompressionError::ChecksumMismatch {
                        expected: expected.clone(),
                        actual,
                    },
                });
            }
        }

        let mut samples = Vec::with_capacity(raw.len() / RECORD_BYTES);
        for (index, window) in raw.chunks_exact(RECORD_BYTES).enumerate() {
            let bytes: &[u8; RECORD_BYTES] = window.try_into().map_err(|_| {
                ChunkError::corrupt(chunk_id, format!("record {index} is not {RECORD_BYTES} bytes"))
            })?;
            let sample = decode(bytes, meta.base_date).map_err(|source| ChunkError::Decode {
                chunk_id: chunk_id.to_string(),
                index,
                source,
            })?;
            samples.push(sample);
        }

        debug!(chunk_id = %chunk_id, ticks = samples.len(), "chunk read");
        Ok(samples)
    }

    /// Chunk ids in write order, across all symbols or for one symbol.
    pub fn list_chunks(&self, symbol: Option<&str>) -> Result<Vec<String>, ChunkError> {
        let key = match symbol {
            Some(symbol) => self.keys.symbol_index_key(symbol),
            None => self.keys.all_index_key(),
        };
        Ok(self.store.index_members(&key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecError, StoreError};
    use crate::market_data::{RawTick, TickRecord};
    use crate::storage::compression::ZlibCompressor;
    use crate::storage::store::{FileChunkStore, MemoryChunkStore};
    use crate::storage::writer::ChunkWriter;
    use chrono::{NaiveDate, NaiveDateTime};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 6).unwrap()
    }

    fn received(h: u32, m: u32, s: u32) -> NaiveDateTime {
        date().and_hms_opt(h, m, s).unwrap()
    }

    fn raw(time: &str, close: i64, volume: i64, received_at: NaiveDateTime) -> RawTick {
        RawTick {
            code: Some("005930".into()),
            time: Some(time.into()),
            open: Some(close - 100),
            high: Some(close + 100),
            low: Some(close - 200),
            close: Some(close),
            volume: Some(volume),
            change_rate: Some(0.5),
            previous_day: Some(-300),
            received_at,
        }
    }

    fn rig(compressor: Arc<dyn Compressor>) -> (Arc<MemoryChunkStore>, ChunkWriter, ChunkReader) {
        let store = Arc::new(MemoryChunkStore::new());
        let writer = ChunkWriter::new(store.clone(), compressor.clone(), KeySpace::default());
        let reader = ChunkReader::new(store.clone(), compressor, KeySpace::default());
        (store, writer, reader)
    }

    fn zlib_rig() -> (Arc<MemoryChunkStore>, ChunkWriter, ChunkReader) {
        rig(Arc::new(ZlibCompressor::default()))
    }

    fn records() -> Vec<TickRecord> {
        vec![
            raw("090005", 51_100, 10, received(9, 0, 5)),
            raw("090047", 51_200, 20, received(9, 0, 47)),
            raw("090103", 51_000, 30, received(9, 1, 3)),
        ]
        .into_iter()
        .map(|r| r.validate().unwrap())
        .collect()
    }

    #[test]
    fn three_tick_scenario() {
        let records = records();
        let keys: Vec<String> = records.iter().map(|r| r.minute_key().to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "005930_20250806_0900",
                "005930_20250806_0900",
                "005930_20250806_0901"
            ]
        );

        let (_, writer, reader) = zlib_rig();
        let outcome = writer.write("c1", &records, date()).unwrap();
        assert_eq!(outcome.meta.count, 3);
        assert_eq!(outcome.meta.raw_bytes, 48);
        assert!(outcome.rejected.is_empty());

        let samples = reader.read("c1").unwrap();
        assert_eq!(samples.len(), 3);
        let times: Vec<NaiveDateTime> = samples.iter().map(|s| s.at).collect();
        assert_eq!(
            times,
            vec![received(9, 0, 5), received(9, 0, 47), received(9, 1, 3)]
        );
        assert_eq!(samples[1].close, 51_200);
        assert_eq!(samples[2].volume, 30);
        assert_eq!(samples[0].previous_day, -300);
    }

    #[test]
    fn meta_is_stored_under_prefixed_keys() {
        let (store, writer, reader) = zlib_rig();
        writer.write("c1", &records(), date()).unwrap();

        let fields = store.get_meta("ticks:chunk:c1:meta").unwrap().unwrap();
        assert_eq!(fields["count"], "3");
        assert_eq!(fields["rawBytes"], "48");
        assert_eq!(fields["baseDate"], "2025-08-06");
        assert_eq!(fields["codec"], "zlib");
        assert!(store.get_blob("ticks:chunk:c1:blob").unwrap().is_some());

        let meta = reader.read_meta("c1").unwrap();
        assert_eq!(meta.symbol.as_deref(), Some("005930"));
        assert_eq!(meta.checksum.map(|c| c.len()), Some(64));
    }

    #[test]
    fn missing_chunk_is_not_found() {
        let (store, writer, reader) = zlib_rig();
        assert!(matches!(reader.read("nope"), Err(ChunkError::ChunkNotFound(_))));

        writer.write("c1", &records(), date()).unwrap();
        store.remove("ticks:chunk:c1:blob");
        assert!(matches!(reader.read("c1"), Err(ChunkError::ChunkNotFound(_))));
    }

    #[test]
    fn empty_meta_is_not_found() {
        let (store, _, reader) = zlib_rig();
        store.put_meta("ticks:chunk:c1:meta", Default::default());
        store.put_blob("ticks:chunk:c1:blob", vec![1, 2, 3]);
        assert!(matches!(reader.read("c1"), Err(ChunkError::ChunkNotFound(_))));
    }

    #[test]
    fn inconsistent_meta_is_corrupt() {
        let (store, writer, reader) = zlib_rig();
        writer.write("c1", &records(), date()).unwrap();

        let mut fields = store.get_meta("ticks:chunk:c1:meta").unwrap().unwrap();
        fields.insert("rawBytes".into(), "47".into());
        store.put_meta("ticks:chunk:c1:meta", fields.clone());
        assert!(matches!(reader.read("c1"), Err(ChunkError::CorruptMetadata { .. })));

        fields.insert("rawBytes".into(), "48".into());
        fields.insert("baseDate".into(), "yesterday".into());
        store.put_meta("ticks:chunk:c1:meta", fields);
        assert!(matches!(reader.read("c1"), Err(ChunkError::CorruptMetadata { .. })));
    }

    #[test]
    fn codec_mismatch_is_corrupt() {
        let (store, writer, reader) = zlib_rig();
        writer.write("c1", &records(), date()).unwrap();
        let mut fields = store.get_meta("ticks:chunk:c1:meta").unwrap().unwrap();
        fields.insert("codec".into(), "zstd".into());
        store.put_meta("ticks:chunk:c1:meta", fields);
        assert!(matches!(reader.read("c1"), Err(ChunkError::CorruptMetadata { .. })));
    }

    #[test]
    fn damaged_blob_fails_decompression() {
        let (store, writer, reader) = zlib_rig();
        writer.write("c1", &records(), date()).unwrap();
        store.put_blob("ticks:chunk:c1:blob", vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(reader.read("c1"), Err(ChunkError::Decompression { .. })));
    }

    #[test]
    fn checksum_mismatch_fails_decompression() {
        let (store, writer, reader) = zlib_rig();
        writer.write("c1", &records(), date()).unwrap();
        let mut fields = store.get_meta("ticks:chunk:c1:meta").unwrap().unwrap();
        fields.insert("checksum".into(), "00".repeat(32));
        store.put_meta("ticks:chunk:c1:meta", fields);

        match reader.read("c1") {
            Err(ChunkError::Decompression { source, .. }) => {
                assert!(matches!(source, CompressionError::ChecksumMismatch { .. }))
            }
            other => panic!("expected checksum failure, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_record_fails_whole_chunk() {
        let (store, writer, reader) = rig(Arc::new(Passthrough));
        writer.write("c1", &records(), date()).unwrap();

        let mut blob = store.get_blob("ticks:chunk:c1:blob").unwrap().unwrap();
        // Second record: seconds 0xFFFF plus the high time bit.
        blob[16] = 0xFF;
        blob[17] = 0xFF;
        blob[31] |= 0x80;
        store.put_blob("ticks:chunk:c1:blob", blob);
        let mut fields = store.get_meta("ticks:chunk:c1:meta").unwrap().unwrap();
        fields.remove("checksum");
        store.put_meta("ticks:chunk:c1:meta", fields);

        match reader.read("c1") {
            Err(ChunkError::Decode { index, source, .. }) => {
                assert_eq!(index, 1);
                assert!(matches!(source, CodecError::ImplausibleTime(_)));
            }
            other => panic!("expected decode failure, got {other:?}"),
        }
    }

    #[test]
    fn uncompressed_chunk_reads_with_any_reader() {
        let store = Arc::new(MemoryChunkStore::new());
        let writer = ChunkWriter::new(store.clone(), Arc::new(Passthrough), KeySpace::default());
        writer.write("c1", &records(), date()).unwrap();

        let fields = store.get_meta("ticks:chunk:c1:meta").unwrap().unwrap();
        assert_eq!(fields["compressed"], "false");

        let reader = ChunkReader::new(store, Arc::new(ZlibCompressor::default()), KeySpace::default());
        assert_eq!(reader.read("c1").unwrap().len(), 3);
    }

    #[test]
    fn out_of_range_record_is_skipped_and_reported() {
        let mut records = records();
        records[1].close = 70_000;
        let (_, writer, reader) = zlib_rig();

        let outcome = writer.write("c1", &records, date()).unwrap();
        assert_eq!(outcome.meta.count, 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].0, 1);

        let samples = reader.read("c1").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].at, received(9, 0, 5));
        assert_eq!(samples[1].at, received(9, 1, 3));
    }

    #[test]
    fn nothing_encodable_stores_nothing() {
        let (store, writer, reader) = zlib_rig();
        assert!(matches!(writer.write("c1", &[], date()), Err(ChunkError::EmptyChunk(_))));

        let mut records = records();
        for r in &mut records {
            r.volume = u64::from(u32::MAX) + 1;
        }
        assert!(matches!(writer.write("c2", &records, date()), Err(ChunkError::EmptyChunk(_))));
        assert_eq!(store.chunk_count(), 0);
        assert!(reader.list_chunks(None).unwrap().is_empty());
    }

    #[test]
    fn index_lists_chunks_in_write_order() {
        let (_, writer, reader) = zlib_rig();
        writer.write("a", &records(), date()).unwrap();

        let mut other = records();
        for r in &mut other {
            r.symbol = "000660".into();
        }
        writer.write("b", &other, date()).unwrap();

        let mut mixed = records();
        mixed[0].symbol = "000660".into();
        let outcome = writer.write("c", &mixed, date()).unwrap();
        assert_eq!(outcome.meta.symbol, None);

        assert_eq!(reader.list_chunks(None).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(reader.list_chunks(Some("000660")).unwrap(), vec!["b"]);
        assert_eq!(reader.list_chunks(Some("005930")).unwrap(), vec!["a"]);
        assert!(reader.list_chunks(Some("035720")).unwrap().is_empty());
    }

    #[test]
    fn oversized_meta_fails_cleanly() {
        let (store, writer, reader) = zlib_rig();
        writer.write("c1", &records(), date()).unwrap();

        let mut fields = store.get_meta("ticks:chunk:c1:meta").unwrap().unwrap();
        fields.insert("count".into(), "576460752303423488".into());
        fields.insert("rawBytes".into(), "9223372036854775808".into());
        store.put_meta("ticks:chunk:c1:meta", fields.clone());
        match reader.read("c1") {
            Err(ChunkError::Decompression { source, .. }) => {
                assert!(matches!(source, CompressionError::SizeMismatch { actual: 48, .. }))
            }
            other => panic!("expected size mismatch, got {other:?}"),
        }

        fields.insert("compressed".into(), "false".into());
        store.put_meta("ticks:chunk:c1:meta", fields);
        assert!(matches!(reader.read("c1"), Err(ChunkError::Decompression { .. })));
    }

    #[test]
    fn chunk_id_cannot_be_rewritten() {
        let (_, writer, reader) = zlib_rig();
        let first = records();
        writer.write("c1", &first[..1], date()).unwrap();

        let err = writer.write("c1", &first[1..], date()).unwrap_err();
        assert!(matches!(err, ChunkError::Store(StoreError::AlreadyExists(_))));

        let samples = reader.read("c1").unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].close, 51_100);
        assert_eq!(reader.list_chunks(None).unwrap(), vec!["c1"]);
        assert_eq!(reader.list_chunks(Some("005930")).unwrap(), vec!["c1"]);
    }

    #[test]
    fn file_store_roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let compressor: Arc<dyn Compressor> = Arc::new(ZlibCompressor::default());
        {
            let store = Arc::new(FileChunkStore::open(dir.path()).unwrap());
            let writer = ChunkWriter::new(store, compressor.clone(), KeySpace::default());
            writer.write("c1", &records(), date()).unwrap();
            writer.write("c2", &records()[2..], date()).unwrap();
        }

        let store = Arc::new(FileChunkStore::open(dir.path()).unwrap());
        let reader = ChunkReader::new(store.clone(), compressor.clone(), KeySpace::default());
        assert_eq!(reader.list_chunks(Some("005930")).unwrap(), vec!["c1", "c2"]);

        let samples = reader.read("c1").unwrap();
        let closes: Vec<u16> = samples.iter().map(|s| s.close).collect();
        assert_eq!(closes, vec![51_100, 51_200, 51_000]);
        assert_eq!(samples[2].at, received(9, 1, 3));
        assert_eq!(reader.read("c2").unwrap().len(), 1);
        assert_eq!(reader.read_meta("c1").unwrap().raw_bytes, 48);
        assert!(matches!(reader.read("c3"), Err(ChunkError::ChunkNotFound(_))));

        let writer = ChunkWriter::new(store, compressor, KeySpace::default());
        assert!(writer.write("c1", &records(), date()).is_err());
        assert_eq!(reader.read("c1").unwrap().len(), 3);
    }
}
