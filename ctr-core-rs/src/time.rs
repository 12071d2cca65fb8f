//! Timestamp helpers

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::error::EncodingError;

/// Parse RFC 3339, or a zone-less `yyyy-MM-ddTHH:mm:ss[.fff]` taken as UTC
pub fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>, EncodingError> {
    let trimmed = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts);
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return Ok(Utc.from_utc_datetime(&naive).into());
        }
    }
    Err(EncodingError::InvalidTimestamp(text.to_string()))
}

/// Epoch seconds at a fixed UTC offset (minutes)
pub fn from_epoch(seconds: i64, offset_minutes: i32) -> Result<DateTime<FixedOffset>, EncodingError> {
    let offset = FixedOffset::east_opt(offset_minutes * 60)
        .ok_or_else(|| EncodingError::InvalidTimestamp(format!("offset {offset_minutes}")))?;
    offset
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| EncodingError::InvalidTimestamp(seconds.to_string()))
}
