//! Timestamp handling for backend and channel payloads.
//!
//! The backend emits either RFC 3339 strings or naive ISO-8601 strings
//! without an offset (`2020-05-01T12:00:00.123456`). Naive values are UTC.

use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

const NAIVE: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const NAIVE_SUBSECOND: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");

/// Parses a wire timestamp, returning `None` when it matches no accepted shape.
///
/// ```
/// use cws_core::timestamp::parse_timestamp;
///
/// let a = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
/// let b = parse_timestamp("2024-01-01T00:00:00").unwrap();
/// assert_eq!(a, b);
/// assert!(parse_timestamp("yesterday").is_none());
/// ```
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }
    PrimitiveDateTime::parse(raw, NAIVE_SUBSECOND)
        .or_else(|_| PrimitiveDateTime::parse(raw, NAIVE))
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Parses a wire timestamp, falling back to the current time when it is
/// missing or malformed.
pub fn parse_or_now(raw: Option<&str>) -> OffsetDateTime {
    raw.and_then(parse_timestamp)
        .unwrap_or_else(OffsetDateTime::now_utc)
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Serde adapter: RFC 3339 on output, lenient on input.
pub mod lenient {
    use super::*;

    pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time::serde::rfc3339::serialize(value, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(parse_or_now(raw.as_deref()))
    }
}
