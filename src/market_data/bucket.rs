// =============================================================================
// Minute Bucketer — deterministic (symbol, minute) keys
// =============================================================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::market_data::tick::truncate_to_minute;

/// Placeholder used when a tick carries no symbol.
const UNKNOWN_SYMBOL: &str = "unknown";

/// Grouping key for one symbol's ticks within one minute.
///
/// `Invalid` is produced when no timestamp could be derived; it never
/// compares equal to a real minute, so malformed ticks cannot leak into a
/// real bar.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum MinuteKey {
    Minute { symbol: String, minute: NaiveDateTime },
    Invalid { symbol: String },
}

impl MinuteKey {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Minute { symbol, .. } | Self::Invalid { symbol } => symbol,
        }
    }

    /// Start of the minute, `None` for the invalid key.
    pub fn minute(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Minute { minute, .. } => Some(*minute),
            Self::Invalid { .. } => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Minute { .. })
    }
}

impl std::fmt::Display for MinuteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute { symbol, minute } => {
                write!(f, "{}_{}", symbol, minute.format("%Y%m%d_%H%M"))
            }
            Self::Invalid { symbol } => write!(f, "{symbol}_invalid"),
        }
    }
}

/// Derive the minute key for `symbol` at `timestamp`.
///
/// Seconds and sub-seconds are dropped, so two ticks share a key exactly when
/// they fall in the same wall-clock minute of the same day.
pub fn bucket(symbol: Option<&str>, timestamp: Option<NaiveDateTime>) -> MinuteKey {
    let symbol = match symbol {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => UNKNOWN_SYMBOL.to_string(),
    };
    match timestamp.and_then(truncate_to_minute) {
        Some(minute) => MinuteKey::Minute { symbol, minute },
        None => MinuteKey::Invalid { symbol },
    }
}
