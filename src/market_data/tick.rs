// =============================================================================
// Tick records — raw feed shape, validation, derived timestamps
// =============================================================================

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::market_data::bucket::{bucket, MinuteKey};

/// A tick as delivered by the upstream feed. Every field may be absent or
/// malformed; nothing here is trusted until [`RawTick::validate`] accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTick {
    pub code: Option<String>,
    /// Time of day as `HHMMSS`.
    pub time: Option<String>,
    pub open: Option<i64>,
    pub high: Option<i64>,
    pub low: Option<i64>,
    pub close: Option<i64>,
    pub volume: Option<i64>,
    /// Percentage change versus the previous close.
    pub change_rate: Option<f64>,
    /// Price delta versus the previous day.
    pub previous_day: Option<i64>,
    /// Assigned by the ingesting server, never read from the wire.
    pub received_at: NaiveDateTime,
}

/// A fully validated tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub symbol: String,
    pub time: NaiveTime,
    pub open: u32,
    pub high: u32,
    pub low: u32,
    pub close: u32,
    pub volume: u64,
    pub change_rate: f64,
    pub previous_day: i64,
    pub received_at: NaiveDateTime,
}

impl RawTick {
    /// Parse one feed message.
    ///
    /// Expected shape (numbers may arrive as JSON strings):
    /// ```json
    /// { "code": "005930", "time": "090005", "open": "71000", "high": "71200",
    ///   "low": "70900", "close": "71100", "volume": "120",
    ///   "changeRate": "0.42", "previousDay": "300" }
    /// ```
    ///
    /// Only a message that is not a JSON object is an error. Missing or
    /// unparsable fields become `None` and are rejected later by the
    /// validator.
    pub fn from_json(text: &str, received_at: NaiveDateTime) -> Result<Self> {
        let root: serde_json::Value =
            serde_json::from_str(text).context("failed to parse tick JSON")?;
        let obj = root.as_object().context("tick message is not a JSON object")?;

        let field = |name: &str| obj.get(name).filter(|v| !v.is_null());

        Ok(Self {
            code: field("code").and_then(|v| v.as_str()).map(str::to_string),
            time: field("time").and_then(|v| v.as_str()).map(str::to_string),
            open: field("open").and_then(lenient_i64),
            high: field("high").and_then(lenient_i64),
            low: field("low").and_then(lenient_i64),
            close: field("close").and_then(lenient_i64),
            volume: field("volume").and_then(lenient_i64),
            change_rate: field("changeRate").and_then(lenient_f64),
            previous_day: field("previousDay").and_then(lenient_i64),
            received_at,
        })
    }

    /// Check every rule and produce a [`TickRecord`], or the first rule that
    /// failed. Never panics, whatever the input.
    pub fn validate(&self) -> Result<TickRecord, ValidationError> {
        let symbol = match self.code.as_deref() {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => return Err(ValidationError::MissingSymbol),
        };

        let raw_time = self.time.as_deref().ok_or(ValidationError::MissingTime)?;
        if !is_six_digits(raw_time) {
            return Err(ValidationError::MalformedTime(raw_time.to_string()));
        }
        let time = parse_hhmmss(raw_time)
            .ok_or_else(|| ValidationError::UnparsableTime(raw_time.to_string()))?;

        let close = price("close", self.close)?;
        let open = price("open", self.open)?;
        let high = price("high", self.high)?;
        let low = price("low", self.low)?;

        let volume = match self.volume {
            None => return Err(ValidationError::MissingVolume),
            // Zero volume means no executed trade.
            Some(v) if v <= 0 => return Err(ValidationError::NonPositiveVolume(v)),
            Some(v) => v as u64,
        };

        let change_rate = self.change_rate.ok_or(ValidationError::MissingChangeRate)?;
        if !(-100.0..=100.0).contains(&change_rate) {
            return Err(ValidationError::ChangeRateOutOfRange(change_rate));
        }

        let previous_day = self.previous_day.ok_or(ValidationError::MissingPreviousDay)?;

        Ok(TickRecord {
            symbol,
            time,
            open,
            high,
            low,
            close,
            volume,
            change_rate,
            previous_day,
            received_at: self.received_at,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The `HHMMSS` field anchored to `date`, or `None` if it cannot be parsed.
    pub fn parsed_date_time_on(&self, date: NaiveDate) -> Option<NaiveDateTime> {
        let raw = self.time.as_deref()?;
        if !is_six_digits(raw) {
            return None;
        }
        parse_hhmmss(raw).map(|t| date.and_time(t))
    }

    /// The `HHMMSS` field anchored to the processing (receipt) date.
    pub fn parsed_date_time(&self) -> Option<NaiveDateTime> {
        self.parsed_date_time_on(self.received_at.date())
    }

    /// [`parsed_date_time_on`](Self::parsed_date_time_on) truncated to the minute.
    pub fn truncated_minute_on(&self, date: NaiveDate) -> Option<NaiveDateTime> {
        self.parsed_date_time_on(date).and_then(truncate_to_minute)
    }

    pub fn truncated_minute(&self) -> Option<NaiveDateTime> {
        self.truncated_minute_on(self.received_at.date())
    }

    /// Minute bucket for this tick; the invalid key when the time cannot be
    /// derived.
    pub fn minute_key(&self) -> MinuteKey {
        bucket(self.code.as_deref(), self.parsed_date_time())
    }
}

impl TickRecord {
    /// Trade time anchored to `date`.
    pub fn timestamp_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.time)
    }

    /// Trade time anchored to the receipt date.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp_on(self.received_at.date())
    }

    pub fn minute_key(&self) -> MinuteKey {
        bucket(Some(&self.symbol), Some(self.timestamp()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn price(field: &'static str, value: Option<i64>) -> Result<u32, ValidationError> {
    let value = value.ok_or(ValidationError::MissingPrice(field))?;
    u32::try_from(value).map_err(|_| ValidationError::PriceOutOfRange { field, value })
}

fn is_six_digits(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a six-digit `HHMMSS`. Rejects out-of-range components such as
/// `996099` or a leap second `235960`.
fn parse_hhmmss(s: &str) -> Option<NaiveTime> {
    let h = s.get(0..2)?.parse().ok()?;
    let m = s.get(2..4)?.parse().ok()?;
    let sec = s.get(4..6)?.parse().ok()?;
    NaiveTime::from_hms_opt(h, m, sec)
}

pub(crate) fn truncate_to_minute(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    dt.with_second(0).and_then(|d| d.with_nanosecond(0))
}

/// Feed numbers arrive either as JSON numbers or as decimal strings.
fn lenient_i64(val: &serde_json::Value) -> Option<i64> {
    match val {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_f64(val: &serde_json::Value) -> Option<f64> {
    match val {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
