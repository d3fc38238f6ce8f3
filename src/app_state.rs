// =============================================================================
// Central Application State
// =============================================================================
//
// Wires the configured store, writer, reader, pipeline and flusher together.
// Every component is constructed here and passed down explicitly; nothing is
// global.
//
// Thread safety:
//   - Atomic counters in IngestStats.
//   - parking_lot locks inside the pipeline and the minute bar buffer.
//   - Arc wrappers for everything shared with background tasks.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ingest::{spawn_flusher, FlushHandle, IngestPipeline, IngestStats, IngestStatsSnapshot};
use crate::market_data::MinuteBarBuffer;
use crate::runtime_config::RuntimeConfig;
use crate::storage::{
    ChunkReader, ChunkStore, ChunkWriter, Compressor, KeySpace, Passthrough, ZlibCompressor,
};

/// Compressor used for new chunks.
pub fn write_compressor(config: &RuntimeConfig) -> Arc<dyn Compressor> {
    if config.compress {
        Arc::new(ZlibCompressor::new(config.compression_level))
    } else {
        Arc::new(Passthrough)
    }
}

/// Reader over `store`. Uncompressed chunks are read whatever the current
/// `compress` setting.
pub fn build_reader(config: &RuntimeConfig, store: Arc<dyn ChunkStore>) -> ChunkReader {
    ChunkReader::new(
        store,
        Arc::new(ZlibCompressor::new(config.compression_level)),
        KeySpace::new(config.key_prefix.clone()),
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub uptime_secs: u64,
    pub open_symbols: Vec<String>,
    pub open_minute_bars: usize,
    pub stats: IngestStatsSnapshot,
}

pub struct AppState {
    pub config: RuntimeConfig,
    pub store: Arc<dyn ChunkStore>,
    pub reader: Arc<ChunkReader>,
    pub pipeline: Arc<IngestPipeline>,
    pub minute_bars: Arc<MinuteBarBuffer>,
    pub stats: Arc<IngestStats>,
    pub start_time: Instant,
    flush: FlushHandle,
    flusher_task: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    /// Build the state and start the flusher. Must be called from within a
    /// tokio runtime.
    pub fn new(config: RuntimeConfig, store: Arc<dyn ChunkStore>) -> Self {
        let keys = KeySpace::new(config.key_prefix.clone());
        let writer = Arc::new(ChunkWriter::new(
            store.clone(),
            write_compressor(&config),
            keys,
        ));
        let stats = Arc::new(IngestStats::new());
        let (flush, task) = spawn_flusher(writer, config.flush_queue_capacity, stats.clone());

        let minute_bars = Arc::new(MinuteBarBuffer::new());
        let pipeline = Arc::new(IngestPipeline::new(
            config.chunk_capacity,
            minute_bars.clone(),
            flush.clone(),
            stats.clone(),
        ));
        let reader = Arc::new(build_reader(&config, store.clone()));

        Self {
            config,
            store,
            reader,
            pipeline,
            minute_bars,
            stats,
            start_time: Instant::now(),
            flush,
            flusher_task: Mutex::new(Some(task)),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            open_symbols: self.pipeline.open_symbols(),
            open_minute_bars: self.minute_bars.len(),
            stats: self.stats.snapshot(),
        }
    }

    /// Seal every open chunk, wait for the flusher to write them and stop it.
    pub async fn shutdown(&self) {
        let sealed = self.pipeline.flush_all();
        info!(sealed, "final flush");
        self.flush.shutdown().await;

        let task = self.flusher_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "flusher task ended abnormally");
            }
        }
    }
}
