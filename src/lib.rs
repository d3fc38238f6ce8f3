// =============================================================================
// tickvault — tick ingestion, 16-byte binary codec and chunked tick storage
// =============================================================================
//
// Data flow:
//   raw tick ─► validator ─► minute bucketer ─► minute bar buffer
//                   │
//                   └─► per-symbol TickChunk (16-byte records)
//                            │  sealed (full / date rollover / periodic flush)
//                            ▼
//                   bounded handoff ─► background flusher ─► ChunkWriter ─► ChunkStore
//
//   ChunkStore ─► ChunkReader ─► ordered Vec<TickSample>
// =============================================================================

pub mod app_state;
pub mod error;
pub mod ingest;
pub mod market_data;
pub mod runtime_config;
pub mod storage;

pub use error::{ChunkError, CodecError, CompressionError, StoreError, ValidationError};
pub use market_data::{bucket, MinuteBar, MinuteBarBuffer, MinuteKey, RawTick, TickRecord};
pub use storage::{
    ChunkMeta, ChunkReader, ChunkStore, ChunkWriter, Compressor, FileChunkStore, KeySpace,
    MemoryChunkStore, Passthrough, TickChunk, TickSample, ZlibCompressor,
};
