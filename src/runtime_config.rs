// =============================================================================
// Runtime Configuration — ingestion and storage settings with atomic save
// =============================================================================
//
// Every field carries a serde default so an empty or partial JSON file loads.
// Persistence uses an atomic tmp + rename so a crash never leaves a
// half-written file behind.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::storage::{DEFAULT_CHUNK_CAPACITY, DEFAULT_KEY_PREFIX, MAX_CHUNK_CAPACITY};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "tickvault.json";

/// Env var naming an alternative config file.
pub const ENV_CONFIG_PATH: &str = "TICKVAULT_CONFIG";

/// Env var overriding `store_dir`.
pub const ENV_STORE_DIR: &str = "TICKVAULT_STORE_DIR";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_chunk_capacity() -> usize {
    DEFAULT_CHUNK_CAPACITY
}

fn default_compression_level() -> u32 {
    6
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/chunks")
}

fn default_flush_queue_capacity() -> usize {
    64
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_minute_bar_grace_secs() -> u64 {
    10
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Chunking -------------------------------------------------------------

    /// Ticks per chunk before it is sealed.
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,

    /// Compress blobs with zlib; when off, blobs are the raw records.
    #[serde(default = "default_true")]
    pub compress: bool,

    /// zlib level, 0..=9.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    // --- Store ----------------------------------------------------------------

    /// Key prefix, `ticks:chunk` gives `ticks:chunk:{id}:meta`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Root directory of the file-backed chunk store.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    // --- Background work ------------------------------------------------------

    /// Sealed chunks that may wait for the flusher before new ones are
    /// dropped.
    #[serde(default = "default_flush_queue_capacity")]
    pub flush_queue_capacity: usize,

    /// Seconds between forced seals of partially filled chunks.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// How long after a minute ends its bar is still open to late ticks.
    #[serde(default = "default_minute_bar_grace_secs")]
    pub minute_bar_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: default_chunk_capacity(),
            compress: true,
            compression_level: default_compression_level(),
            key_prefix: default_key_prefix(),
            store_dir: default_store_dir(),
            flush_queue_capacity: default_flush_queue_capacity(),
            flush_interval_secs: default_flush_interval_secs(),
            minute_bar_grace_secs: default_minute_bar_grace_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;

        info!(
            path = %path.display(),
            chunk_capacity = config.chunk_capacity,
            compress = config.compress,
            store_dir = %config.store_dir.display(),
            "config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }

    /// Apply `TICKVAULT_STORE_DIR` from `lookup` when set and non-empty.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_STORE_DIR).filter(|d| !d.trim().is_empty()) {
            self.store_dir = PathBuf::from(dir.trim());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_capacity == 0 {
            bail!("chunk_capacity must be at least 1");
        }
        if self.chunk_capacity > MAX_CHUNK_CAPACITY {
            bail!(
                "chunk_capacity {} exceeds the maximum of {}",
                self.chunk_capacity,
                MAX_CHUNK_CAPACITY
            );
        }
        if self.compression_level > 9 {
            bail!(
                "compression_level {} is outside 0..=9",
                self.compression_level
            );
        }
        if self.flush_queue_capacity == 0 {
            bail!("flush_queue_capacity must be at least 1");
        }
        if self.key_prefix.trim().is_empty() {
            bail!("key_prefix must not be empty");
        }
        Ok(())
    }
}

/// Config file to read: `TICKVAULT_CONFIG` when set, otherwise
/// `tickvault.json`.
pub fn config_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup(ENV_CONFIG_PATH)
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
