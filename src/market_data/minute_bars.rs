use std::collections::HashMap;

use chrono::{NaiveDateTime, NaiveTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market_data::bucket::MinuteKey;
use crate::market_data::tick::TickRecord;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One-minute OHLCV projection built from trade prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteBar {
    pub symbol: String,
    pub minute: NaiveDateTime,
    pub open: u32,
    pub high: u32,
    pub low: u32,
    pub close: u32,
    pub volume: u64,
    pub tick_count: u64,
    /// Trade time of the tick that set `open`.
    #[serde(skip)]
    first_at: NaiveTime,
    /// Trade time of the tick that set `close`.
    #[serde(skip)]
    last_at: NaiveTime,
}

impl MinuteBar {
    fn start(symbol: &str, minute: NaiveDateTime, tick: &TickRecord) -> Self {
        Self {
            symbol: symbol.to_string(),
            minute,
            open: tick.close,
            high: tick.close,
            low: tick.close,
            close: tick.close,
            volume: tick.volume,
            tick_count: 1,
            first_at: tick.time,
            last_at: tick.time,
        }
    }

    /// Fold one more trade in. Late ticks within the minute may still move
    /// `open`; ties keep arrival order.
    fn absorb(&mut self, tick: &TickRecord) {
        self.high = self.high.max(tick.close);
        self.low = self.low.min(tick.close);
        self.volume = self.volume.saturating_add(tick.volume);
        self.tick_count += 1;

        if tick.time < self.first_at {
            self.first_at = tick.time;
            self.open = tick.close;
        }
        if tick.time >= self.last_at {
            self.last_at = tick.time;
            self.close = tick.close;
        }
    }
}

// ---------------------------------------------------------------------------
// MinuteBarBuffer -- thread-safe open bars keyed by minute key
// ---------------------------------------------------------------------------

/// Accumulates ticks into per-minute bars until the minute is complete and
/// the bar is drained by a downstream consumer.
pub struct MinuteBarBuffer {
    bars: RwLock<HashMap<MinuteKey, MinuteBar>>,
}

impl Default for MinuteBarBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MinuteBarBuffer {
    pub fn new() -> Self {
        Self {
            bars: RwLock::new(HashMap::new()),
        }
    }

    /// Add a validated tick under `key`. Ticks under the invalid key are
    /// refused and `false` is returned.
    pub fn add(&self, key: &MinuteKey, tick: &TickRecord) -> bool {
        let MinuteKey::Minute { symbol, minute } = key else {
            debug!(key = %key, "tick without a derivable minute skipped");
            return false;
        };

        let mut map = self.bars.write();
        match map.get_mut(key) {
            Some(bar) => bar.absorb(tick),
            None => {
                map.insert(key.clone(), MinuteBar::start(symbol, *minute, tick));
            }
        }
        true
    }

    /// Current state of an open bar.
    pub fn get(&self, key: &MinuteKey) -> Option<MinuteBar> {
        self.bars.read().get(key).cloned()
    }

    /// Remove and return every bar whose minute is at or before `up_to`,
    /// ordered by minute then symbol.
    pub fn drain_completed(&self, up_to: NaiveDateTime) -> Vec<MinuteBar> {
        let mut map = self.bars.write();
        let done: Vec<MinuteKey> = map
            .iter()
            .filter(|(_, bar)| bar.minute <= up_to)
            .map(|(key, _)| key.clone())
            .collect();

        let mut out: Vec<MinuteBar> = done.iter().filter_map(|k| map.remove(k)).collect();
        out.sort_by(|a, b| a.minute.cmp(&b.minute).then_with(|| a.symbol.cmp(&b.symbol)));
        out
    }

    /// Remove and return every open bar.
    pub fn drain_all(&self) -> Vec<MinuteBar> {
        self.drain_completed(NaiveDateTime::MAX)
    }

    /// Number of open bars.
    pub fn len(&self) -> usize {
        self.bars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::bucket::bucket;
    use chrono::NaiveDate;

    fn tick(h: u32, m: u32, s: u32, close: u32, volume: u64) -> TickRecord {
        let date = NaiveDate::from_ymd_opt(2025, 8, 6).unwrap();
        TickRecord {
            symbol: "005930".into(),
            time: NaiveTime::from_hms_opt(h, m, s).unwrap(),
            open: 70_000,
            high: 72_000,
            low: 69_000,
            close,
            volume,
            change_rate: 0.5,
            previous_day: 100,
            received_at: date.and_hms_opt(h, m, s).unwrap(),
        }
    }

    fn add(buf: &MinuteBarBuffer, t: &TickRecord) -> MinuteKey {
        let key = t.minute_key();
        assert!(buf.add(&key, t));
        key
    }

    #[test]
    fn aggregates_ohlcv_within_a_minute() {
        let buf = MinuteBarBuffer::new();
        add(&buf, &tick(9, 0, 5, 100, 10));
        add(&buf, &tick(9, 0, 20, 105, 5));
        let key = add(&buf, &tick(9, 0, 47, 98, 7));

        let bar = buf.get(&key).expect("bar exists");
        assert_eq!(bar.open, 100);
        assert_eq!(bar.high, 105);
        assert_eq!(bar.low, 98);
        assert_eq!(bar.close, 98);
        assert_eq!(bar.volume, 22);
        assert_eq!(bar.tick_count, 3);
    }

    #[test]
    fn late_tick_can_move_open() {
        let buf = MinuteBarBuffer::new();
        add(&buf, &tick(9, 0, 30, 100, 1));
        let key = add(&buf, &tick(9, 0, 10, 90, 1));
        let bar = buf.get(&key).unwrap();
        assert_eq!(bar.open, 90);
        assert_eq!(bar.close, 100);
    }

    #[test]
    fn minute_boundary_starts_a_new_bar() {
        let buf = MinuteBarBuffer::new();
        add(&buf, &tick(9, 0, 59, 100, 1));
        add(&buf, &tick(9, 1, 0, 101, 1));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn drain_completed_keeps_open_minutes() {
        let buf = MinuteBarBuffer::new();
        add(&buf, &tick(9, 0, 5, 100, 1));
        add(&buf, &tick(9, 1, 3, 101, 1));
        add(&buf, &tick(9, 2, 0, 102, 1));

        let up_to = NaiveDate::from_ymd_opt(2025, 8, 6).unwrap().and_hms_opt(9, 1, 0).unwrap();
        let done = buf.drain_completed(up_to);
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].close, 100);
        assert_eq!(done[1].close, 101);
        assert_eq!(buf.len(), 1);

        assert_eq!(buf.drain_all().len(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn invalid_key_is_refused() {
        let buf = MinuteBarBuffer::new();
        let key = bucket(Some("005930"), None);
        assert!(!buf.add(&key, &tick(9, 0, 0, 1, 1)));
        assert!(buf.is_empty());
    }
}
