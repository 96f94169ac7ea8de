//! Periodic system snapshot publisher

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use super::publisher::EventPublisher;
use super::snapshot::SnapshotSource;
use crate::config::PipelineConfig;
use crate::types::{AssetEvent, SYSTEM_METRICS_EVENT_TYPE};

/// Publishes one `system_metrics` event per interval
///
/// The first tick waits for a short startup delay so a fleet of agents booting
/// together does not publish in lockstep. A failed tick (source or broker) is
/// logged and skipped; the schedule is never shortened to retry.
pub struct SnapshotPublisher {
    publisher: EventPublisher,
    source: Arc<dyn SnapshotSource>,
    node_id: String,
    interval: Duration,
    startup_delay: Duration,
}

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    SourceFailed,
    PublishFailed,
}

impl SnapshotPublisher {
    pub fn new(
        publisher: EventPublisher,
        source: Arc<dyn SnapshotSource>,
        node_id: impl Into<String>,
        interval: Duration,
        startup_delay: Duration,
    ) -> Self {
        Self {
            publisher,
            source,
            node_id: node_id.into(),
            interval,
            startup_delay,
        }
    }

    /// Publisher using the configured node id, interval and startup delay
    pub fn from_config(
        publisher: EventPublisher,
        source: Arc<dyn SnapshotSource>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(
            publisher,
            source,
            config.node_id.clone(),
            config.snapshot_interval,
            config.snapshot_startup_delay,
        )
    }

    /// Asset id used for this node's snapshots
    pub fn asset_id(&self) -> String {
        format!("system-{}", self.node_id)
    }

    /// Collect and publish a single snapshot
    pub async fn tick(&self) -> TickOutcome {
        let snapshot = match self.source.collect().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "system snapshot failed, skipping this cycle");
                return TickOutcome::SourceFailed;
            }
        };

        let event = AssetEvent::new(
            self.asset_id(),
            SYSTEM_METRICS_EVENT_TYPE,
            Value::Object(snapshot),
            self.node_id.clone(),
        );

        match self.publisher.publish(&event).await {
            Ok(_) => {
                info!(asset_id = %event.asset_id, "published system_metrics event");
                TickOutcome::Published
            }
            Err(e) => {
                warn!(error = %e, "failed to publish system snapshot");
                TickOutcome::PublishFailed
            }
        }
    }

    /// Tick on schedule until `shutdown` flips to `true`
    ///
    /// Shutdown also cancels a tick that is still collecting or publishing.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            startup_delay_secs = self.startup_delay.as_secs(),
            "system snapshot publisher started"
        );

        let mut delay = self.startup_delay;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = tokio::time::sleep(delay) => {}
            }
            // A slow snapshot or publish is abandoned on shutdown
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = self.tick() => {}
            }
            delay = self.interval;
        }

        info!("system snapshot publisher stopped");
    }
}
