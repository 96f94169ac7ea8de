//! Event aggregator - bounded retention and running statistics
//!
//! The aggregator has a single writer and any number of readers:
//!
//! - [`Aggregator`] is owned by the consumer task. It is not `Clone`, and every
//!   mutation takes `&mut self`, so folding is serialized by construction.
//! - [`EventQuery`] is a cheap, cloneable read handle for the query surface.
//!
//! A fold (buffer append, eviction, counters, last-processed time) happens
//! under one write lock, so readers never observe a partial update. Reads hold
//! the read lock only long enough to clone what they return.

mod buffer;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::types::{AggregateStats, AssetEvent, DecodeError};

pub use buffer::RetentionBuffer;

/// Default retention capacity
pub const DEFAULT_RETENTION_CAPACITY: usize = 1000;

struct AggregateState {
    buffer: RetentionBuffer<Arc<AssetEvent>>,
    stats: AggregateStats,
    /// Messages dropped because they failed to decode
    rejected: u64,
}

/// Single-writer owner of the retention buffer and statistics
pub struct Aggregator {
    state: Arc<RwLock<AggregateState>>,
}

impl Aggregator {
    /// Create an empty aggregator retaining at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(AggregateState {
                buffer: RetentionBuffer::new(capacity),
                stats: AggregateStats::new(),
                rejected: 0,
            })),
        }
    }

    /// Read handle sharing this aggregator's state
    pub fn query(&self) -> EventQuery {
        EventQuery {
            state: self.state.clone(),
        }
    }

    /// Decode a raw message body and fold it in
    ///
    /// A body that fails to decode leaves the buffer and statistics untouched;
    /// only the rejected-message counter moves.
    pub fn ingest(&mut self, body: &[u8]) -> Result<Arc<AssetEvent>, DecodeError> {
        match AssetEvent::from_wire(body) {
            Ok(event) => Ok(self.fold(event)),
            Err(e) => {
                self.state.write().rejected += 1;
                warn!(error = %e, bytes = body.len(), "rejected malformed event");
                Err(e)
            }
        }
    }

    /// Fold an already decoded event, stamping it with the current time
    pub fn fold(&mut self, event: AssetEvent) -> Arc<AssetEvent> {
        self.fold_at(event, Utc::now())
    }

    /// Fold an event with an explicit aggregation time
    pub fn fold_at(&mut self, event: AssetEvent, at: DateTime<Utc>) -> Arc<AssetEvent> {
        let event = Arc::new(event);
        let mut state = self.state.write();
        state.buffer.push(event.clone());
        state.stats.record(&event.event_type, at);
        debug!(
            asset_id = %event.asset_id,
            event_type = %event.event_type,
            node_id = %event.node_id,
            total = state.stats.total_events_processed,
            "processed event"
        );
        event
    }
}

/// Read-only, point-in-time views over the aggregator state
#[derive(Clone)]
pub struct EventQuery {
    state: Arc<RwLock<AggregateState>>,
}

impl EventQuery {
    /// Last `limit` events in arrival order, most recent last
    ///
    /// `limit <= 0` yields an empty list; a limit beyond the retained count
    /// yields everything retained.
    pub fn recent_events(&self, limit: i64) -> Vec<Arc<AssetEvent>> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        self.state.read().buffer.recent(limit).cloned().collect()
    }

    /// Consistent snapshot of the counters
    pub fn current_stats(&self) -> AggregateStats {
        self.state.read().stats.clone()
    }

    /// Number of messages dropped as malformed
    pub fn rejected_messages(&self) -> u64 {
        self.state.read().rejected
    }

    /// Number of events currently retained
    pub fn retained(&self) -> usize {
        self.state.read().buffer.len()
    }

    /// Retention capacity
    pub fn capacity(&self) -> usize {
        self.state.read().buffer.capacity()
    }
}
