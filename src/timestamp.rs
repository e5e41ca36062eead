//! Vendor timestamp normalization.
//!
//! Vendors report the `date` of a reading either as epoch seconds (integer or
//! fractional) or as RFC 3339 text. Both are kept verbatim on the record and
//! converted into a fresh [`OffsetDateTime`] on demand, so repeated merges over
//! the same inputs never observe a previously normalized value.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Error, Result};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(f64),
    Text(String),
    /// Anything else the vendor sent (`null`, booleans, objects). Kept so the
    /// record fails on its own instead of failing the payload.
    Unreadable(serde_json::Value),
}

impl RawTimestamp {
    pub fn epoch(seconds: f64) -> Self {
        RawTimestamp::Epoch(seconds)
    }

    pub fn text(value: impl Into<String>) -> Self {
        RawTimestamp::Text(value.into())
    }

    /// Stand-in for an absent `date` field.
    pub fn missing() -> Self {
        RawTimestamp::Unreadable(serde_json::Value::Null)
    }

    /// Converts into a UTC instant.
    pub fn to_instant(&self) -> Result<OffsetDateTime> {
        match self {
            RawTimestamp::Epoch(seconds) => from_epoch_seconds(*seconds),
            RawTimestamp::Text(text) => parse_text(text),
            RawTimestamp::Unreadable(value) => Err(Error::malformed(
                value.to_string(),
                "expected RFC 3339 text or epoch seconds",
            )),
        }
    }
}

impl fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawTimestamp::Epoch(seconds) => write!(f, "{seconds}"),
            RawTimestamp::Text(text) => f.write_str(text),
            RawTimestamp::Unreadable(value) => write!(f, "{value}"),
        }
    }
}

fn from_epoch_seconds(seconds: f64) -> Result<OffsetDateTime> {
    if !seconds.is_finite() {
        return Err(Error::malformed(seconds.to_string(), "epoch is not finite"));
    }
    let whole = seconds.floor();
    if whole.abs() > i64::MAX as f64 {
        return Err(Error::malformed(seconds.to_string(), "epoch out of range"));
    }
    let frac_nanos = ((seconds - whole) * NANOS_PER_SEC).round() as i128;
    let nanos = (whole as i128) * 1_000_000_000 + frac_nanos;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|err| Error::malformed(seconds.to_string(), err.to_string()))
}

fn parse_text(text: &str) -> Result<OffsetDateTime> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::malformed(text, "empty timestamp"));
    }
    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed.to_offset(time::UtcOffset::UTC));
    }
    match trimmed.parse::<f64>() {
        Ok(seconds) => from_epoch_seconds(seconds).map_err(|_| {
            Error::malformed(text, "epoch out of range")
        }),
        Err(_) => Err(Error::malformed(
            text,
            "expected RFC 3339 text or epoch seconds",
        )),
    }
}

/// Renders an instant the way the CSV and document sinks store it.
pub fn format_rfc3339(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

/// Absolute distance between two instants in (fractional) seconds.
pub fn abs_diff_seconds(a: OffsetDateTime, b: OffsetDateTime) -> f64 {
    (a - b).abs().as_seconds_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn epoch_seconds_become_utc() {
        let ts = RawTimestamp::epoch(100.0).to_instant().unwrap();
        assert_eq!(ts, datetime!(1970-01-01 00:01:40 UTC));
    }

    #[test]
    fn fractional_epoch_keeps_sub_second_part() {
        let ts = RawTimestamp::epoch(1.5).to_instant().unwrap();
        assert_eq!(ts.unix_timestamp_nanos(), 1_500_000_000);
    }

    #[test]
    fn rfc3339_text_is_normalized_to_utc() {
        let ts = RawTimestamp::text("2022-05-01T12:00:00+03:00")
            .to_instant()
            .unwrap();
        assert_eq!(ts, datetime!(2022-05-01 09:00:00 UTC));
        assert_eq!(ts.offset(), time::UtcOffset::UTC);
    }

    #[test]
    fn numeric_text_is_read_as_epoch() {
        let ts = RawTimestamp::text(" 60 ").to_instant().unwrap();
        assert_eq!(ts.unix_timestamp(), 60);
    }

    #[test]
    fn garbage_is_malformed() {
        for raw in [
            RawTimestamp::text("yesterday"),
            RawTimestamp::text(""),
            RawTimestamp::epoch(f64::NAN),
            RawTimestamp::epoch(f64::INFINITY),
            RawTimestamp::epoch(1e30),
        ] {
            let err = raw.to_instant().unwrap_err();
            assert!(
                matches!(err, Error::MalformedTimestamp { .. }),
                "{raw} -> {err}"
            );
        }
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let values: Vec<RawTimestamp> =
            serde_json::from_str(r#"[1650000000, 1.25, "2022-01-01T00:00:00Z"]"#).unwrap();
        assert_eq!(values[0], RawTimestamp::Epoch(1_650_000_000.0));
        assert_eq!(values[1], RawTimestamp::Epoch(1.25));
        assert_eq!(values[2], RawTimestamp::text("2022-01-01T00:00:00Z"));
    }

    #[test]
    fn other_json_values_decode_but_never_convert() {
        let values: Vec<RawTimestamp> =
            serde_json::from_str(r#"[null, true, {"s": 1}]"#).unwrap();
        assert_eq!(values[0], RawTimestamp::missing());
        for raw in values {
            assert!(matches!(
                raw.to_instant(),
                Err(Error::MalformedTimestamp { .. })
            ));
        }
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = datetime!(2022-01-01 00:00:00 UTC);
        let b = datetime!(2022-01-01 00:00:02.5 UTC);
        assert_eq!(abs_diff_seconds(a, b), 2.5);
        assert_eq!(abs_diff_seconds(b, a), 2.5);
    }
}
