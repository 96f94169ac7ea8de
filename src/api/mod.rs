//! HTTP surface of the collector and agent services
//!
//! The collector exposes the read-only query surface over the aggregate; the
//! agent accepts ad-hoc events and publishes them to the queue.

pub mod http;
pub mod ingress;
pub mod rest;
pub mod state;

pub use http::{agent_router, collector_router};
pub use state::{AgentState, CollectorState};
