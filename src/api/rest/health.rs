//! Greeting and health endpoints of the collector

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use super::{timestamp_now, Greeting};
use crate::api::state::CollectorState;
use crate::consumer::ConnectionState;

/// Response for GET /healthz
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` while connected to the queue, `degraded` otherwise
    pub status: &'static str,
    pub timestamp: String,
    pub queue_status: ConnectionState,
}

/// GET /
pub async fn root() -> impl IntoResponse {
    Json(Greeting {
        msg: "Hello from Asset Collector Service",
        node_id: None,
    })
}

/// GET /healthz
///
/// Always 200: a broker outage degrades the service but queries still work.
pub async fn health_check(State(state): State<Arc<CollectorState>>) -> impl IntoResponse {
    let queue_status = state.connection_state();
    let status = if queue_status.is_connected() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        timestamp: timestamp_now(),
        queue_status,
    })
}
