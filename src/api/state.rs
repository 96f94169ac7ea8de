//! Shared state handed to the HTTP handlers

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::aggregator::EventQuery;
use crate::consumer::ConnectionState;
use crate::producer::EventPublisher;

/// State of the collector service: read-only view of the aggregate plus the
/// consumer's connection status
pub struct CollectorState {
    pub query: EventQuery,
    pub status: watch::Receiver<ConnectionState>,
}

impl CollectorState {
    pub fn new(query: EventQuery, status: watch::Receiver<ConnectionState>) -> Self {
        Self { query, status }
    }

    /// Current connection state of the consumer
    pub fn connection_state(&self) -> ConnectionState {
        *self.status.borrow()
    }
}

/// State of the agent service
pub struct AgentState {
    pub publisher: EventPublisher,
    /// Default `node_id` for submitted events
    pub node_id: String,
    collected: AtomicU64,
    failed: AtomicU64,
}

impl AgentState {
    pub fn new(publisher: EventPublisher, node_id: impl Into<String>) -> Self {
        Self {
            publisher,
            node_id: node_id.into(),
            collected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn record_collected(&self) {
        self.collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn collected(&self) -> u64 {
        self.collected.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
