//! Asset event - the unit of transport and aggregation
//!
//! This module defines the wire schema shared by agents and the collector.
//! Events are immutable once published: the aggregator stores them behind an
//! `Arc` and only ever mutates the containers holding them.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::validation::{validate_event, ValidationError};

/// Event type used by the periodic system snapshot publisher
pub const SYSTEM_METRICS_EVENT_TYPE: &str = "system_metrics";

/// A telemetry or state-change event emitted by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEvent {
    /// Asset the event is about (not unique across event types)
    pub asset_id: String,

    /// Aggregation key, e.g. `system_metrics` or an agent-defined type
    pub event_type: String,

    /// Creation time assigned by the producer
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Opaque payload, stored and forwarded but never inspected
    pub data: serde_json::Value,

    /// Agent that produced the event
    pub node_id: String,
}

impl AssetEvent {
    /// Create a new event stamped with the current time
    pub fn new(
        asset_id: impl Into<String>,
        event_type: impl Into<String>,
        data: serde_json::Value,
        node_id: impl Into<String>,
    ) -> Self {
        Self::with_timestamp(asset_id, event_type, Utc::now(), data, node_id)
    }

    /// Create a new event with an explicit producer timestamp
    pub fn with_timestamp(
        asset_id: impl Into<String>,
        event_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            event_type: event_type.into(),
            timestamp,
            data,
            node_id: node_id.into(),
        }
    }

    /// Serialize to the wire format (UTF-8 JSON)
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode and validate a message body
    pub fn from_wire(body: &[u8]) -> Result<Self, DecodeError> {
        let event: AssetEvent = serde_json::from_slice(body)?;
        validate_event(&event)?;
        Ok(event)
    }
}

/// Errors raised while decoding a queue message body
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid event: {0}")]
    Invalid(#[from] ValidationError),
}

/// Accept RFC 3339 with any offset, or a naive ISO-8601 datetime taken as UTC.
///
/// Some agents serialize naive datetimes without an offset.
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid ISO-8601 timestamp '{}'", raw))
    })
}

/// Parse an ISO-8601 timestamp into UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_wire_roundtrip_preserves_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let event = AssetEvent::with_timestamp(
            "pump-7",
            "login",
            ts,
            json!({"user": "ops", "tags": ["a", "b"]}),
            "node-1",
        );

        let body = event.to_wire().unwrap();
        let text = String::from_utf8(body.clone()).unwrap();
        assert!(text.contains("\"timestamp\":\"2024-05-01T12:30:00Z\""));

        let decoded = AssetEvent::from_wire(&body).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_naive_timestamp_as_utc() {
        let body = br#"{"asset_id":"a","event_type":"t","timestamp":"2024-05-01T12:30:00.123456","data":{},"node_id":"n"}"#;
        let event = AssetEvent::from_wire(body).unwrap();
        assert_eq!(event.timestamp.timestamp(), 1714566600);
    }

    #[test]
    fn test_decode_offset_timestamp_normalized() {
        let body = br#"{"asset_id":"a","event_type":"t","timestamp":"2024-05-01T14:30:00+02:00","data":null,"node_id":"n"}"#;
        let event = AssetEvent::from_wire(body).unwrap();
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());
        assert!(event.data.is_null());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(AssetEvent::from_wire(b"not json"), Err(DecodeError::Json(_))));
        assert!(matches!(AssetEvent::from_wire(&[0xff, 0xfe]), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let body = br#"{"asset_id":"a","event_type":"t","data":{},"node_id":"n"}"#;
        assert!(matches!(AssetEvent::from_wire(body), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_bad_timestamp() {
        let body = br#"{"asset_id":"a","event_type":"t","timestamp":"yesterday","data":{},"node_id":"n"}"#;
        assert!(AssetEvent::from_wire(body).is_err());
    }

    #[test]
    fn test_decode_rejects_empty_identifiers() {
        let body = br#"{"asset_id":"","event_type":"t","timestamp":"2024-05-01T12:30:00Z","data":{},"node_id":"n"}"#;
        assert!(matches!(AssetEvent::from_wire(body), Err(DecodeError::Invalid(_))));
    }
}
