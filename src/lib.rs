//! Asset Event Pipeline
//!
//! Ingests telemetry and state-change events from distributed agents through a
//! durable AMQP queue and folds them into a bounded, queryable in-memory view.
//!
//! # Features
//!
//! - **Durable transport**: persistent messages, publisher confirms, manual acks
//! - **Self-healing consumer**: reconnects with bounded exponential backoff
//! - **Bounded memory**: retention buffer keeps the last N events
//! - **Consistent stats**: buffer and counters updated under one lock
//! - **Periodic snapshots**: `system_metrics` events from each agent
//!
//! # Modules
//!
//! - `types`: Event and aggregate statistics
//! - `validation`: Required-field checks for events
//! - `config`: Environment configuration
//! - `broker`: Broker abstraction, AMQP and in-memory implementations
//! - `aggregator`: Single-writer aggregate and its read handle
//! - `consumer`: Connection manager driving the aggregator
//! - `producer`: Ad-hoc and periodic publishers
//! - `api`: HTTP routers of the collector and agent services
//! - `logging`: tracing subscriber setup
//! - `shutdown`: Signal handling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use asset_events::{Aggregator, AssetEvent, EventPublisher, InMemoryBroker};
//! use serde_json::json;
//!
//! # async fn demo() -> asset_events::AppResult<()> {
//! let broker = InMemoryBroker::new();
//! let publisher = EventPublisher::new(Arc::new(broker.clone()), "asset_events");
//! publisher
//!     .publish(&AssetEvent::new("pump-1", "login", json!({}), "node-a"))
//!     .await?;
//!
//! let aggregator = Aggregator::new(1000);
//! let query = aggregator.query();
//! assert_eq!(query.current_stats().total_events_processed, 0);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod api;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod logging;
pub mod producer;
pub mod shutdown;
pub mod types;
pub mod validation;

// Re-export commonly used items at crate root
pub use aggregator::{Aggregator, EventQuery};
pub use broker::{AmqpBroker, Broker, BrokerError, InMemoryBroker};
pub use config::{ConfigError, PipelineConfig};
pub use consumer::{BackoffPolicy, ConnectionManager, ConnectionState, ConsumerSettings};
pub use producer::{
    EventPublisher, PublishAck, PublishError, ShellSnapshotSource, SnapshotPublisher,
    SnapshotSource,
};
pub use types::{AggregateStats, AppResult, AssetEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
