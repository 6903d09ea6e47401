//! Sortable text encoding for points in time.
//!
//! Values are written as `yyyy-MM-ddTHH:mm:ss.fffZ` (UTC) or
//! `yyyy-MM-ddTHH:mm:ss.fff+hh:mm` (any other offset), with millisecond
//! precision. UTC encodings sort byte-wise in time order, so they double as
//! literals in range filters such as `CreationDate < :threshold`.
//!
//! Decoding never fails: empty or malformed text yields [`MIN`], which callers
//! must read as "no date". [`decode_opt`] does that mapping.

use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::{datetime, format_description};
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Sentinel returned for absent or unreadable input.
pub const MIN: OffsetDateTime = datetime!(0001-01-01 0:00 UTC);

/// Encodes a point in time, truncated to milliseconds, keeping its offset.
#[must_use]
pub fn encode(value: OffsetDateTime) -> String {
    let mut text = value
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
        ))
        .unwrap_or_default();

    if value.offset().is_utc() {
        text.push('Z');
    } else {
        let offset = value
            .offset()
            .format(format_description!(
                "[offset_hour sign:mandatory]:[offset_minute]"
            ))
            .unwrap_or_default();
        text.push_str(&offset);
    }
    text
}

/// Encodes a point in time after converting it to UTC.
///
/// This is the form persisted attributes and filter literals use.
#[must_use]
pub fn encode_utc(value: OffsetDateTime) -> String {
    encode(value.to_offset(UtcOffset::UTC))
}

/// Converts to UTC and drops precision below a millisecond, giving the value
/// [`decode`] returns for its encoding.
#[must_use]
pub fn truncate(value: OffsetDateTime) -> OffsetDateTime {
    let value = value.to_offset(UtcOffset::UTC);
    value - Duration::nanoseconds(i64::from(value.nanosecond() % 1_000_000))
}

/// Converts to UTC and drops the fractional second, as stored by
/// epoch-second attributes such as `TTL`.
#[must_use]
pub fn truncate_seconds(value: OffsetDateTime) -> OffsetDateTime {
    let value = value.to_offset(UtcOffset::UTC);
    value - Duration::nanoseconds(i64::from(value.nanosecond()))
}

/// Decodes text produced by [`encode`].
///
/// The fraction is optional and a missing offset is read as UTC.
#[must_use]
pub fn decode(text: &str) -> OffsetDateTime {
    if text.is_empty() {
        return MIN;
    }

    if let Ok(value) = OffsetDateTime::parse(text, &Rfc3339) {
        return value;
    }

    PrimitiveDateTime::parse(
        text,
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
        ),
    )
    .map(PrimitiveDateTime::assume_utc)
    .unwrap_or(MIN)
}

/// Decodes optional text, mapping absent input and the sentinel to `None`.
#[must_use]
pub fn decode_opt(text: Option<&str>) -> Option<OffsetDateTime> {
    text.map(decode).filter(|value| *value != MIN)
}

/// Serde adapter for `Option<OffsetDateTime>` attributes.
///
/// Writes [`encode_utc`] text; reads anything, treating unreadable values as absent.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&encode_utc(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(decode_opt(value.as_ref().and_then(serde_json::Value::as_str)))
    }
}
