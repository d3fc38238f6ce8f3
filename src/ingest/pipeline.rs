// =============================================================================
// Ingest Pipeline — validate, bucket, accumulate per symbol, seal
// =============================================================================
//
// Each symbol owns one lane: a mutex-guarded open chunk. Ticks of one symbol
// are appended in arrival order; different symbols only contend on the lane
// map lookup. A lane is sealed and handed to the flusher when its chunk is
// full, when a tick arrives on a new receipt date, or on an explicit flush.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{CodecError, ValidationError};
use crate::ingest::flusher::FlushHandle;
use crate::ingest::stats::IngestStats;
use crate::market_data::{MinuteBarBuffer, MinuteKey, RawTick, TickRecord};
use crate::storage::TickChunk;

/// What happened to one ingested tick.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Validated, counted in its minute bar and appended to the open chunk.
    Stored(MinuteKey),
    /// Validated and counted in its minute bar, but a value does not fit the
    /// record layout so it was not stored.
    NotStored { key: MinuteKey, error: CodecError },
    /// Refused by the validator.
    Rejected(ValidationError),
}

type Lane = Arc<Mutex<Option<TickChunk>>>;

pub struct IngestPipeline {
    lanes: RwLock<HashMap<String, Lane>>,
    chunk_capacity: usize,
    minute_bars: Arc<MinuteBarBuffer>,
    flush: FlushHandle,
    stats: Arc<IngestStats>,
}

impl IngestPipeline {
    pub fn new(
        chunk_capacity: usize,
        minute_bars: Arc<MinuteBarBuffer>,
        flush: FlushHandle,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            lanes: RwLock::new(HashMap::new()),
            chunk_capacity: chunk_capacity.max(1),
            minute_bars,
            flush,
            stats,
        }
    }

    pub fn minute_bars(&self) -> &Arc<MinuteBarBuffer> {
        &self.minute_bars
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// Process one raw tick. Never blocks on storage.
    pub fn ingest(&self, raw: RawTick) -> IngestOutcome {
        let record = match raw.validate() {
            Ok(record) => record,
            Err(e) => {
                self.stats.record_rejected();
                warn!(symbol = ?raw.code, time = ?raw.time, reason = %e, "tick rejected");
                return IngestOutcome::Rejected(e);
            }
        };

        let key = record.minute_key();
        self.minute_bars.add(&key, &record);

        match self.append(&record) {
            Ok(()) => {
                self.stats.record_accepted();
                debug!(key = %key, close = record.close, volume = record.volume, "tick stored");
                IngestOutcome::Stored(key)
            }
            Err(error) => {
                self.stats.record_encode_rejected();
                warn!(key = %key, error = %error, "tick does not fit the record layout");
                IngestOutcome::NotStored { key, error }
            }
        }
    }

    /// Seal every non-empty lane. Returns how many chunks were handed to the
    /// flusher.
    pub fn flush_all(&self) -> usize {
        let lanes: Vec<Lane> = self.lanes.read().values().cloned().collect();
        lanes
            .iter()
            .filter_map(|lane| lane.lock().take())
            .map(|chunk| self.flush.submit(chunk))
            .filter(|submitted| *submitted)
            .count()
    }

    /// Symbols that currently hold unsealed ticks.
    pub fn open_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .lanes
            .read()
            .iter()
            .filter(|(_, lane)| lane.lock().as_ref().is_some_and(|c| !c.is_empty()))
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    fn append(&self, record: &TickRecord) -> Result<(), CodecError> {
        let lane = self.lane(&record.symbol);
        let mut open = lane.lock();
        let date = record.received_at.date();

        if open.as_ref().is_some_and(|c| c.base_date() != date) {
            if let Some(chunk) = open.take() {
                debug!(symbol = %record.symbol, previous = %chunk.base_date(), next = %date, "date rollover");
                self.flush.submit(chunk);
            }
        }

        let chunk = open.get_or_insert_with(|| TickChunk::new(&record.symbol, date, self.chunk_capacity));
        chunk.push(record)?;

        if chunk.is_full() {
            if let Some(chunk) = open.take() {
                self.flush.submit(chunk);
            }
        }
        Ok(())
    }

    fn lane(&self, symbol: &str) -> Lane {
        if let Some(lane) = self.lanes.read().get(symbol) {
            return lane.clone();
        }
        self.lanes
            .write()
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }
}
