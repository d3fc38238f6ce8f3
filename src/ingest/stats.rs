// =============================================================================
// Ingest counters — lock-free, shared by the pipeline and the flusher
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct IngestStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    encode_rejected: AtomicU64,
    chunks_sealed: AtomicU64,
    chunks_written: AtomicU64,
    chunks_dropped: AtomicU64,
    write_failures: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    /// Ticks that passed validation and were appended to a chunk.
    pub accepted: u64,
    /// Ticks refused by the validator.
    pub rejected: u64,
    /// Valid ticks whose values do not fit the record layout.
    pub encode_rejected: u64,
    pub chunks_sealed: u64,
    pub chunks_written: u64,
    /// Sealed chunks discarded because the flush queue was full.
    pub chunks_dropped: u64,
    pub write_failures: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encode_rejected(&self) {
        self.encode_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sealed(&self) {
        self.chunks_sealed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self) {
        self.chunks_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            encode_rejected: self.encode_rejected.load(Ordering::Relaxed),
            chunks_sealed: self.chunks_sealed.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}
