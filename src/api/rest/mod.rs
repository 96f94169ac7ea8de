//! REST endpoints of the collector service
//!
//! - `GET /` - Service greeting
//! - `GET /events?limit=N` - Most recent events, oldest first
//! - `GET /stats` - Aggregate statistics
//! - `GET /healthz` - Health with queue connection status
//! - `GET /metrics` - Counters as JSON

pub mod events;
pub mod health;
pub mod metrics;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "VALIDATION_ERROR".to_string(),
        }
    }
}

/// Greeting returned by `GET /`
#[derive(Debug, Serialize)]
pub struct Greeting {
    pub msg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// Current time as RFC 3339 with a `Z` suffix
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
