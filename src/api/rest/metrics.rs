//! Collector counters

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::state::CollectorState;

/// Response for GET /metrics
#[derive(Debug, Serialize)]
pub struct CollectorMetrics {
    pub collector_events_processed_total: u64,
    pub collector_events_by_type: BTreeMap<String, u64>,
    pub collector_messages_rejected_total: u64,
    /// 1 while connected to the queue, else 0
    pub collector_queue_connection_status: u8,
}

pub async fn get_metrics(State(state): State<Arc<CollectorState>>) -> impl IntoResponse {
    let stats = state.query.current_stats();

    Json(CollectorMetrics {
        collector_events_processed_total: stats.total_events_processed,
        collector_events_by_type: stats.events_by_type,
        collector_messages_rejected_total: state.query.rejected_messages(),
        collector_queue_connection_status: u8::from(state.connection_state().is_connected()),
    })
}
