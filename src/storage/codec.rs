// =============================================================================
// Binary Tick Codec — fixed 16-byte little-endian records
// =============================================================================
//
// Layout (all little-endian):
//
//   offset  width  field
//   ------  -----  -----------------------------------------------------------
//        0  u16    seconds since midnight of the chunk base date, low 16 bits
//        2  u16    open
//        4  u16    high
//        6  u16    low
//        8  u16    close
//       10  u32    volume
//       14  u16    aux: bit 15    seconds bit 16
//                       bit 14    previous-day sign (1 = negative)
//                       bits 0-13 previous-day magnitude (0..=16383)
//
// The calendar date is not part of the record; all records of a chunk share
// the base date stored in chunk metadata.
// =============================================================================

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::market_data::TickRecord;

/// Size of one encoded record.
pub const RECORD_BYTES: usize = 16;

/// Largest previous-day magnitude the aux field can hold.
pub const MAX_PREVIOUS_DAY: i64 = 0x3FFF;

const AUX_TIME_HIGH_BIT: u16 = 0x8000;
const AUX_NEGATIVE_BIT: u16 = 0x4000;
const AUX_MAGNITUDE_MASK: u16 = 0x3FFF;
const SECONDS_PER_DAY: u32 = 86_400;

/// A tick as carried by one 16-byte record and reconstructed against the
/// chunk base date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSample {
    pub at: NaiveDateTime,
    pub open: u16,
    pub high: u16,
    pub low: u16,
    pub close: u16,
    pub volume: u32,
    pub previous_day: i16,
}

impl TickSample {
    /// Project a validated record onto the encodable fields, anchored to
    /// `base_date`. Fails when any field does not fit its slot.
    pub fn from_record(record: &TickRecord, base_date: NaiveDate) -> Result<Self, CodecError> {
        Ok(Self {
            at: base_date.and_time(record.time.with_nanosecond(0).unwrap_or(record.time)),
            open: fit_u16("open", record.open)?,
            high: fit_u16("high", record.high)?,
            low: fit_u16("low", record.low)?,
            close: fit_u16("close", record.close)?,
            volume: u32::try_from(record.volume).map_err(|_| CodecError::OutOfRange {
                field: "volume",
                value: i64::try_from(record.volume).unwrap_or(i64::MAX),
                min: 0,
                max: i64::from(u32::MAX),
            })?,
            previous_day: fit_previous_day(record.previous_day)?,
        })
    }

    /// Serialise into the 16-byte layout. Only the time of day of `at` is
    /// written.
    pub fn to_bytes(&self) -> [u8; RECORD_BYTES] {
        let seconds = self.at.time().num_seconds_from_midnight();

        let mut aux = self.previous_day.unsigned_abs() & AUX_MAGNITUDE_MASK;
        if self.previous_day < 0 {
            aux |= AUX_NEGATIVE_BIT;
        }
        if seconds > u32::from(u16::MAX) {
            aux |= AUX_TIME_HIGH_BIT;
        }

        let mut out = [0u8; RECORD_BYTES];
        out[0..2].copy_from_slice(&((seconds & 0xFFFF) as u16).to_le_bytes());
        out[2..4].copy_from_slice(&self.open.to_le_bytes());
        out[4..6].copy_from_slice(&self.high.to_le_bytes());
        out[6..8].copy_from_slice(&self.low.to_le_bytes());
        out[8..10].copy_from_slice(&self.close.to_le_bytes());
        out[10..14].copy_from_slice(&self.volume.to_le_bytes());
        out[14..16].copy_from_slice(&aux.to_le_bytes());
        out
    }
}

/// Encode `record` into one 16-byte record relative to `base_date`.
pub fn encode(record: &TickRecord, base_date: NaiveDate) -> Result<[u8; RECORD_BYTES], CodecError> {
    TickSample::from_record(record, base_date).map(|s| s.to_bytes())
}

/// Decode one 16-byte record. The caller is responsible for slicing the
/// buffer on record boundaries.
pub fn decode(buf: &[u8; RECORD_BYTES], base_date: NaiveDate) -> Result<TickSample, CodecError> {
    let le16 = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);

    let aux = le16(14);
    let mut seconds = u32::from(le16(0));
    if aux & AUX_TIME_HIGH_BIT != 0 {
        seconds |= 1 << 16;
    }
    if seconds >= SECONDS_PER_DAY {
        return Err(CodecError::ImplausibleTime(seconds));
    }
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
        .ok_or(CodecError::ImplausibleTime(seconds))?;

    let magnitude = (aux & AUX_MAGNITUDE_MASK) as i16;
    let previous_day = if aux & AUX_NEGATIVE_BIT != 0 {
        if magnitude == 0 {
            return Err(CodecError::NegativeZero);
        }
        -magnitude
    } else {
        magnitude
    };

    Ok(TickSample {
        at: base_date.and_time(time),
        open: le16(2),
        high: le16(4),
        low: le16(6),
        close: le16(8),
        volume: u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]),
        previous_day,
    })
}

fn fit_u16(field: &'static str, value: u32) -> Result<u16, CodecError> {
    u16::try_from(value).map_err(|_| CodecError::OutOfRange {
        field,
        value: i64::from(value),
        min: 0,
        max: i64::from(u16::MAX),
    })
}

fn fit_previous_day(value: i64) -> Result<i16, CodecError> {
    if !(-MAX_PREVIOUS_DAY..=MAX_PREVIOUS_DAY).contains(&value) {
        return Err(CodecError::OutOfRange {
            field: "previous_day",
            value,
            min: -MAX_PREVIOUS_DAY,
            max: MAX_PREVIOUS_DAY,
        });
    }
    Ok(value as i16)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
