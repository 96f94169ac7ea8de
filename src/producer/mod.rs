//! Event producer
//!
//! - [`EventPublisher`]: validates and durably publishes one event per call
//! - [`SnapshotPublisher`]: periodic `system_metrics` events built from a
//!   [`SnapshotSource`]
//! - [`ShellSnapshotSource`]: snapshot source backed by shell probes

mod periodic;
mod publisher;
mod snapshot;

pub use periodic::{SnapshotPublisher, TickOutcome};
pub use publisher::{EventPublisher, PublishAck, PublishError, DEFAULT_PUBLISH_TIMEOUT};
pub use snapshot::{
    ShellSnapshotSource, Snapshot, SnapshotError, SnapshotSource, DEFAULT_PROBES, PROBE_TIMEOUT,
};
