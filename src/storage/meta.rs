// =============================================================================
// Chunk metadata — typed view over the stored field map
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::storage::codec::RECORD_BYTES;
use crate::storage::store::FieldMap;

/// Layout version written into every chunk.
pub const FORMAT_VERSION: u32 = 1;

const F_COUNT: &str = "count";
const F_RAW_BYTES: &str = "rawBytes";
const F_BASE_DATE: &str = "baseDate";
const F_COMPRESSED: &str = "compressed";
const F_SYMBOL: &str = "symbol";
const F_VERSION: &str = "ver";
const F_ENDIAN: &str = "endian";
const F_CODEC: &str = "codec";
const F_LEVEL: &str = "level";
const F_CHECKSUM: &str = "checksum";
const F_CREATED_AT: &str = "createdAt";

/// Descriptor stored alongside every chunk blob.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMeta {
    pub count: usize,
    /// Uncompressed length, always `16 × count`.
    pub raw_bytes: usize,
    pub base_date: NaiveDate,
    pub compressed: bool,
    /// Set when every record in the chunk belongs to one symbol.
    pub symbol: Option<String>,
    pub version: u32,
    pub codec: Option<String>,
    pub level: Option<u32>,
    /// Hex SHA-256 of the raw record bytes.
    pub checksum: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ChunkMeta {
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(F_COUNT.into(), self.count.to_string());
        fields.insert(F_RAW_BYTES.into(), self.raw_bytes.to_string());
        fields.insert(F_BASE_DATE.into(), self.base_date.format("%Y-%m-%d").to_string());
        fields.insert(F_COMPRESSED.into(), self.compressed.to_string());
        fields.insert(F_VERSION.into(), self.version.to_string());
        fields.insert(F_ENDIAN.into(), "LE".into());
        if let Some(symbol) = &self.symbol {
            fields.insert(F_SYMBOL.into(), symbol.clone());
        }
        if let Some(codec) = &self.codec {
            fields.insert(F_CODEC.into(), codec.clone());
        }
        if let Some(level) = self.level {
            fields.insert(F_LEVEL.into(), level.to_string());
        }
        if let Some(checksum) = &self.checksum {
            fields.insert(F_CHECKSUM.into(), checksum.clone());
        }
        if let Some(created_at) = self.created_at {
            fields.insert(F_CREATED_AT.into(), created_at.to_rfc3339());
        }
        fields
    }

    /// Parse a stored field map. `count`, `rawBytes` and `baseDate` are
    /// required; every optional field that is present must parse. The error
    /// is a human-readable reason.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, String> {
        let count: usize = required(fields, F_COUNT)?;
        let raw_bytes: usize = required(fields, F_RAW_BYTES)?;
        let base_date: NaiveDate = required(fields, F_BASE_DATE)?;

        let expected = count
            .checked_mul(RECORD_BYTES)
            .ok_or_else(|| format!("count {count} overflows the raw size"))?;
        if raw_bytes != expected {
            return Err(format!(
                "rawBytes {raw_bytes} does not equal {RECORD_BYTES} x count {count}"
            ));
        }

        if let Some(endian) = fields.get(F_ENDIAN) {
            if endian != "LE" {
                return Err(format!("unsupported endianness {endian:?}"));
            }
        }

        let version = optional(fields, F_VERSION)?.unwrap_or(FORMAT_VERSION);
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }

        let created_at = match fields.get(F_CREATED_AT) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| format!("field {F_CREATED_AT} is unparsable ({raw:?}): {e}"))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Self {
            count,
            raw_bytes,
            base_date,
            // Chunks written without the flag are compressed.
            compressed: optional(fields, F_COMPRESSED)?.unwrap_or(true),
            symbol: fields.get(F_SYMBOL).cloned(),
            version,
            codec: fields.get(F_CODEC).cloned(),
            level: optional(fields, F_LEVEL)?,
            checksum: fields.get(F_CHECKSUM).cloned(),
            created_at,
        })
    }
}

fn required<T>(fields: &FieldMap, name: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional(fields, name)?.ok_or_else(|| format!("missing field {name}"))
}

fn optional<T>(fields: &FieldMap, name: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match fields.get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("field {name} is unparsable ({raw:?}): {e}")),
    }
}
