//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::ingress;
use super::rest::{events, health, metrics};
use super::state::{AgentState, CollectorState};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Router of the collector service
pub fn collector_router(state: Arc<CollectorState>) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/healthz", get(health::health_check))
        .route("/events", get(events::list_events))
        .route("/stats", get(events::get_stats))
        .route("/metrics", get(metrics::get_metrics))
        .layer(cors())
        .with_state(state)
}

/// Router of the agent service
pub fn agent_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/", get(ingress::root))
        .route("/healthz", get(ingress::health_check))
        .route("/events", post(ingress::collect_event))
        .route("/metrics", get(ingress::get_metrics))
        .layer(cors())
        .with_state(state)
}
