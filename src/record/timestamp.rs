use crate::config::types::DisplayZone;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

/// Epoch values below this are taken as seconds, above as milliseconds.
/// 1e11 seconds is the year 5138; 1e11 milliseconds is March 1973.
const EPOCH_SECONDS_LIMIT: i64 = 100_000_000_000;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("failed to parse timestamp '{value}' as {format}: {source}")]
    ParseError {
        value: String,
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("timestamp {0} is out of range")]
    OutOfRange(i64),

    #[error("unsupported timestamp value: {0}")]
    Unsupported(String),
}

/// Parse a transcript timestamp and express it in `zone`.
///
/// Accepts RFC 3339 strings (a trailing `Z` included), ISO 8601 strings
/// without an offset (read as wall-clock time in `zone`), and integer epochs
/// in seconds or milliseconds.
pub fn parse_timestamp(value: &Value, zone: &DisplayZone) -> Result<DateTime<FixedOffset>, TimestampError> {
    match value {
        Value::String(s) => parse_str(s.trim(), zone),
        Value::Number(n) => match n.as_i64() {
            Some(epoch) => parse_epoch(epoch, zone),
            None => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| parse_epoch(f.trunc() as i64, zone))
                .unwrap_or_else(|| Err(TimestampError::Unsupported(n.to_string()))),
        },
        other => Err(TimestampError::Unsupported(other.to_string())),
    }
}

fn parse_str(value: &str, zone: &DisplayZone) -> Result<DateTime<FixedOffset>, TimestampError> {
    let rfc3339_err = match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => return Ok(zone.convert(dt)),
        Err(e) => e,
    };

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return zone
                .from_naive(naive)
                .ok_or_else(|| TimestampError::Unsupported(value.to_string()));
        }
    }

    // Some writers put epoch numbers in strings
    if let Ok(epoch) = value.parse::<i64>() {
        return parse_epoch(epoch, zone);
    }

    Err(TimestampError::ParseError {
        value: value.to_string(),
        format: "iso8601".to_string(),
        source: Box::new(rfc3339_err),
    })
}

fn parse_epoch(epoch: i64, zone: &DisplayZone) -> Result<DateTime<FixedOffset>, TimestampError> {
    let instant = if epoch.abs() < EPOCH_SECONDS_LIMIT {
        Utc.timestamp_opt(epoch, 0).single()
    } else {
        Utc.timestamp_millis_opt(epoch).single()
    };

    instant
        .map(|dt| zone.convert(dt))
        .ok_or(TimestampError::OutOfRange(epoch))
}
