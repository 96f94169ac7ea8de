//! Agent endpoints: ad-hoc event submission
//!
//! - `GET /` - Greeting with the agent's node id
//! - `GET /healthz` - Liveness
//! - `POST /events` - Validate and publish one event
//! - `GET /metrics` - Submission counters

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use super::rest::{timestamp_now, ApiError, Greeting};
use super::state::AgentState;
use crate::types::{deserialize_timestamp, AssetEvent};

/// Body of POST /events
///
/// `node_id` may be omitted; the agent's own node id is used then.
#[derive(Debug, Deserialize)]
pub struct EventPayload {
    pub asset_id: String,
    pub event_type: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub node_id: Option<String>,
}

impl EventPayload {
    pub fn into_event(self, default_node_id: &str) -> AssetEvent {
        let node_id = self
            .node_id
            .unwrap_or_else(|| default_node_id.to_string());
        AssetEvent::with_timestamp(self.asset_id, self.event_type, self.timestamp, self.data, node_id)
    }
}

#[derive(Debug, Serialize)]
pub struct AgentHealth {
    pub status: &'static str,
    pub timestamp: String,
    pub node_id: String,
}

#[derive(Debug, Serialize)]
pub struct AgentMetrics {
    pub agent_events_collected_total: u64,
    pub agent_events_failed_total: u64,
}

/// GET /
pub async fn root(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    Json(Greeting {
        msg: "Hello from Asset Agent Service",
        node_id: Some(state.node_id.clone()),
    })
}

/// GET /healthz
pub async fn health_check(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    Json(AgentHealth {
        status: "healthy",
        timestamp: timestamp_now(),
        node_id: state.node_id.clone(),
    })
}

/// POST /events - Publish one event durably
///
/// 200 once the broker confirmed the message, 422 for an invalid event,
/// 500 when the broker could not be reached or refused the message.
pub async fn collect_event(
    State(state): State<Arc<AgentState>>,
    Json(payload): Json<EventPayload>,
) -> impl IntoResponse {
    let event = payload.into_event(&state.node_id);

    match state.publisher.publish(&event).await {
        Ok(_) => {
            state.record_collected();
            (
                StatusCode::OK,
                Json(json!({"status": "success", "message": "Event collected and queued"})),
            )
                .into_response()
        }
        Err(e) if e.is_validation() => {
            warn!(error = %e, "rejected invalid event");
            (StatusCode::UNPROCESSABLE_ENTITY, Json(ApiError::validation(e.to_string()))).into_response()
        }
        Err(e) => {
            state.record_failed();
            error!(asset_id = %event.asset_id, error = %e, "failed to publish event");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Failed to process event"})),
            )
                .into_response()
        }
    }
}

/// GET /metrics
pub async fn get_metrics(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    Json(AgentMetrics {
        agent_events_collected_total: state.collected(),
        agent_events_failed_total: state.failed(),
    })
}
