//! Checkpoint values
//!
//! A `CheckpointValue` is one observed (or persisted) replication key value.
//! Values are only ordered against values of the same kind; a stream commits
//! to a single `KeyType` and every raw JSON value is parsed under it, so a
//! mixed-type key is rejected at the boundary instead of being coerced.

use crate::error::{Error, Result};
use crate::types::{JsonValue, KeyType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::fmt;

/// A totally ordered replication key value
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointValue {
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
    /// Integer key (ids, sequence numbers, log positions)
    Integer(i64),
    /// Floating point key
    Number(f64),
    /// Opaque ordered token
    Token(String),
}

impl CheckpointValue {
    /// Current wall-clock time as a timestamp value
    pub fn now() -> Self {
        Self::Timestamp(Utc::now())
    }

    /// The key type this value belongs to
    pub fn kind(&self) -> KeyType {
        match self {
            Self::Timestamp(_) => KeyType::Timestamp,
            Self::Integer(_) => KeyType::Integer,
            Self::Number(_) => KeyType::Number,
            Self::Token(_) => KeyType::String,
        }
    }

    /// Parse a raw JSON value under the given key type.
    ///
    /// Returns `None` when the JSON value is not a valid `key_type` value
    /// (including `null`).
    pub fn from_json(value: &JsonValue, key_type: KeyType) -> Option<Self> {
        match key_type {
            KeyType::Timestamp => value.as_str().and_then(parse_timestamp).map(Self::Timestamp),
            KeyType::Integer => value.as_i64().map(Self::Integer),
            KeyType::Number => value.as_f64().map(Self::Number),
            KeyType::String => value.as_str().map(|s| Self::Token(s.to_string())),
        }
    }

    /// Parse a raw JSON value for a named stream, failing with a key type error
    pub fn parse(stream: &str, value: &JsonValue, key_type: KeyType) -> Result<Self> {
        Self::from_json(value, key_type)
            .ok_or_else(|| Error::key_mismatch(stream, key_type.to_string(), value.to_string()))
    }

    /// Serialize to the JSON form stored in the state document
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Timestamp(ts) => JsonValue::String(format_timestamp(ts)),
            Self::Integer(i) => JsonValue::from(*i),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(JsonValue::Null, JsonValue::Number),
            Self::Token(s) => JsonValue::String(s.clone()),
        }
    }

    /// Compare two values of the same kind
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering> {
        match (self, other) {
            (Self::Timestamp(a), Self::Timestamp(b)) => Ok(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Ok(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => Ok(a.total_cmp(b)),
            (Self::Token(a), Self::Token(b)) => Ok(a.cmp(b)),
            _ => Err(Error::IncomparableValues {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }

    /// The smaller of two values
    pub fn try_min(self, other: Self) -> Result<Self> {
        Ok(match self.try_cmp(&other)? {
            Ordering::Greater => other,
            _ => self,
        })
    }

    /// The larger of two values
    pub fn try_max(self, other: Self) -> Result<Self> {
        Ok(match self.try_cmp(&other)? {
            Ordering::Less => other,
            _ => self,
        })
    }
}

impl fmt::Display for CheckpointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Token(s) => f.write_str(s),
        }
    }
}

impl From<DateTime<Utc>> for CheckpointValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<i64> for CheckpointValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

/// Parse RFC 3339, naive ISO 8601 (assumed UTC), or a bare date
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_timestamp_parsing() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();

        for raw in [
            "2024-01-05T00:00:00Z",
            "2024-01-05T00:00:00+00:00",
            "2024-01-05T01:00:00+01:00",
            "2024-01-05T00:00:00",
            "2024-01-05",
        ] {
            let value = CheckpointValue::from_json(&json!(raw), KeyType::Timestamp);
            assert_eq!(value, Some(CheckpointValue::Timestamp(expected)), "{raw}");
        }

        assert!(CheckpointValue::from_json(&json!("yesterday"), KeyType::Timestamp).is_none());
        assert!(CheckpointValue::from_json(&json!(1_704_412_800), KeyType::Timestamp).is_none());
    }

    #[test]
    fn test_timestamp_serializes_with_zulu_suffix() {
        let value = CheckpointValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
        assert_eq!(value.to_json(), json!("2024-01-05T00:00:00Z"));
        assert_eq!(value.to_string(), "2024-01-05T00:00:00Z");
    }

    #[test]
    fn test_integer_rejects_other_json_types() {
        assert_eq!(
            CheckpointValue::from_json(&json!(42), KeyType::Integer),
            Some(CheckpointValue::Integer(42))
        );
        assert!(CheckpointValue::from_json(&json!("42"), KeyType::Integer).is_none());
        assert!(CheckpointValue::from_json(&json!(4.2), KeyType::Integer).is_none());
        assert!(CheckpointValue::from_json(&json!(null), KeyType::Integer).is_none());
    }

    #[test]
    fn test_parse_reports_stream_and_type() {
        let err = CheckpointValue::parse("orders", &json!("abc"), KeyType::Integer).unwrap_err();
        assert!(matches!(err, Error::KeyTypeMismatch { .. }));
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn test_ordering_same_kind() {
        let a = CheckpointValue::Integer(10);
        let b = CheckpointValue::Integer(20);
        assert_eq!(a.try_cmp(&b).unwrap(), Ordering::Less);
        assert_eq!(a.clone().try_max(b.clone()).unwrap(), b);
        assert_eq!(a.clone().try_min(b).unwrap(), a);

        let x = CheckpointValue::Token("abc".into());
        let y = CheckpointValue::Token("abd".into());
        assert_eq!(x.try_cmp(&y).unwrap(), Ordering::Less);

        let m = CheckpointValue::Number(1.5);
        let n = CheckpointValue::Number(-0.5);
        assert_eq!(m.try_cmp(&n).unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_ordering_mixed_kinds_is_an_error() {
        let a = CheckpointValue::Integer(10);
        let b = CheckpointValue::Token("10".into());
        assert!(matches!(
            a.try_cmp(&b),
            Err(Error::IncomparableValues { .. })
        ));
    }
}
