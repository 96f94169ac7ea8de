//! Data types for the asset event pipeline
//!
//! This module contains the wire-level event and the aggregate statistics shared
//! by the producer, the collector and the query surface.

mod event;
mod stats;

pub use event::{deserialize_timestamp, AssetEvent, DecodeError, SYSTEM_METRICS_EVENT_TYPE};
pub use stats::AggregateStats;

/// Result type for binaries and top-level wiring
pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
