pub mod flusher;
pub mod pipeline;
pub mod stats;

pub use flusher::{spawn_flusher, FlushHandle, SealedChunk};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use stats::{IngestStats, IngestStatsSnapshot};
