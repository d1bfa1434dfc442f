//! Coercion of loosely typed JSON values into field types
//!
//! Metadata and observation documents arrive as untyped JSON. Each target
//! type has exactly one coercion function here; shapes that do not fit are
//! reported as [`Error::MalformedInput`] instead of being stringified.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// ISO 8601 without an offset; always interpreted as UTC
pub const ISO8601_NO_OFFSET: &str = "%Y-%m-%dT%H:%M:%S";

/// Coerce a scalar JSON value to a string.
///
/// Numbers and booleans take their canonical JSON text form.
pub fn as_string(v: &Value) -> Result<String> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(Error::malformed("expected string, got null")),
        Value::Array(_) => Err(Error::malformed("expected string, got array")),
        Value::Object(_) => Err(Error::malformed("expected string, got object")),
    }
}

/// Coerce a string or an array of scalars to a string list.
pub fn as_string_array(v: &Value) -> Result<Vec<String>> {
    match v {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items.iter().map(as_string).collect(),
        _ => Err(Error::malformed(format!("expected string array, got {v}"))),
    }
}

/// Coerce an integer or an integer string to an `i64`.
pub fn as_int(v: &Value) -> Result<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::malformed(format!("expected integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::malformed(format!("expected integer, got {s:?}"))),
        _ => Err(Error::malformed(format!("expected integer, got {v}"))),
    }
}

/// Coerce a timestamp string or Unix seconds value to a UTC time.
pub fn as_time(v: &Value) -> Result<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_time(s),
        Value::Number(n) => {
            let secs = n
                .as_i64()
                .ok_or_else(|| Error::malformed(format!("expected Unix seconds, got {n}")))?;
            Utc.timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| Error::malformed(format!("timestamp out of range: {secs}")))
        }
        _ => Err(Error::malformed(format!("expected timestamp, got {v}"))),
    }
}

/// Parse an RFC 3339 timestamp, or an offset-less ISO 8601 one as UTC.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, ISO8601_NO_OFFSET)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::malformed(format!("bad timestamp {s:?}: {e}")))
}

/// Format a time as UTC RFC 3339 with whole seconds (`2009-02-20T13:00:34Z`).
#[must_use]
pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
