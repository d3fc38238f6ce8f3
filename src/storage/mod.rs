// =============================================================================
// Storage — binary codec, chunking, compression and the chunk store
// =============================================================================

pub mod chunk;
pub mod codec;
pub mod compression;
pub mod meta;
pub mod reader;
pub mod store;
pub mod writer;

pub use chunk::{TickChunk, DEFAULT_CHUNK_CAPACITY, MAX_CHUNK_CAPACITY};
pub use codec::{decode, encode, TickSample, MAX_PREVIOUS_DAY, RECORD_BYTES};
pub use compression::{Compressor, Passthrough, ZlibCompressor};
pub use meta::{ChunkMeta, FORMAT_VERSION};
pub use reader::ChunkReader;
pub use store::{ChunkStore, FieldMap, FileChunkStore, KeySpace, MemoryChunkStore, DEFAULT_KEY_PREFIX};
pub use writer::{ChunkWriter, WriteOutcome};
