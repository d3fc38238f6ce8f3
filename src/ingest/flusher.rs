// =============================================================================
// Background Flusher — bounded handoff from ingestion to the chunk writer
// =============================================================================
//
// Ingestion never waits on storage: sealed chunks go through a bounded mpsc
// channel with `try_send`. When the channel is full the newest chunk is
// dropped, counted and logged. The flusher task drains the channel in order
// and runs each write on the blocking pool.
// =============================================================================

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ingest::stats::IngestStats;
use crate::storage::{ChunkWriter, TickChunk};

/// A chunk detached from ingestion, waiting to be written.
#[derive(Debug)]
pub struct SealedChunk {
    pub chunk_id: String,
    pub chunk: TickChunk,
}

enum FlushCommand {
    Persist(SealedChunk),
    /// Acknowledged once every chunk queued before it has been handled.
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable sender side of the flusher.
#[derive(Clone)]
pub struct FlushHandle {
    tx: mpsc::Sender<FlushCommand>,
    stats: Arc<IngestStats>,
}

impl FlushHandle {
    /// Queue `chunk` for writing under a fresh chunk id.
    ///
    /// Returns `false` when the chunk was empty or had to be dropped.
    pub fn submit(&self, chunk: TickChunk) -> bool {
        if chunk.is_empty() {
            return false;
        }
        self.stats.record_sealed();

        let chunk_id = Uuid::new_v4().to_string();
        debug!(chunk_id = %chunk_id, chunk = %chunk, "chunk sealed");
        let symbol = chunk.symbol().to_string();
        let ticks = chunk.count();

        let sealed = SealedChunk {
            chunk_id: chunk_id.clone(),
            chunk,
        };
        match self.tx.try_send(FlushCommand::Persist(sealed)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.record_dropped();
                warn!(
                    chunk_id = %chunk_id,
                    symbol = %symbol,
                    ticks,
                    "flush queue full, sealed chunk dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.record_dropped();
                error!(chunk_id = %chunk_id, symbol = %symbol, "flusher is not running, sealed chunk dropped");
                false
            }
        }
    }

    /// Wait for every queued chunk to be handled, then stop the flusher.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(FlushCommand::Shutdown(ack_tx)).await.is_err() {
            warn!("flusher already stopped");
            return;
        }
        if ack_rx.await.is_err() {
            warn!("flusher exited before acknowledging shutdown");
        }
    }
}

/// Start the flusher task. `capacity` bounds the number of sealed chunks
/// waiting for a write.
pub fn spawn_flusher(
    writer: Arc<ChunkWriter>,
    capacity: usize,
    stats: Arc<IngestStats>,
) -> (FlushHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let handle = FlushHandle {
        tx,
        stats: stats.clone(),
    };

    let task = tokio::spawn(async move {
        info!(capacity, "flusher started");
        while let Some(command) = rx.recv().await {
            match command {
                FlushCommand::Persist(sealed) => persist(&writer, &stats, sealed).await,
                FlushCommand::Shutdown(ack) => {
                    // Chunks that raced in behind the shutdown request.
                    while let Ok(FlushCommand::Persist(sealed)) = rx.try_recv() {
                        persist(&writer, &stats, sealed).await;
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }
        info!("flusher stopped");
    });

    (handle, task)
}

async fn persist(writer: &Arc<ChunkWriter>, stats: &IngestStats, sealed: SealedChunk) {
    let writer = writer.clone();
    let chunk_id = sealed.chunk_id.clone();
    let result =
        tokio::task::spawn_blocking(move || writer.persist(&sealed.chunk_id, &sealed.chunk)).await;

    match result {
        Ok(Ok(_)) => stats.record_written(),
        Ok(Err(e)) => {
            stats.record_write_failure();
            error!(chunk_id = %chunk_id, error = %e, "chunk write failed");
        }
        Err(e) => {
            stats.record_write_failure();
            error!(chunk_id = %chunk_id, error = %e, "chunk write task panicked");
        }
    }
}
