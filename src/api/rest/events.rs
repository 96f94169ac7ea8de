//! Event and statistics endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::api::state::CollectorState;

/// Query parameters for GET /events
#[derive(Debug, Deserialize)]
pub struct EventsParams {
    /// Number of events to return; zero or negative yields an empty list
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /events - Most recent events in arrival order (newest last)
pub async fn list_events(
    State(state): State<Arc<CollectorState>>,
    Query(params): Query<EventsParams>,
) -> impl IntoResponse {
    Json(state.query.recent_events(params.limit))
}

/// GET /stats - Consistent snapshot of the aggregate statistics
pub async fn get_stats(State(state): State<Arc<CollectorState>>) -> impl IntoResponse {
    Json(state.query.current_stats())
}
