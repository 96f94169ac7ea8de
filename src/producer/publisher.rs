//! Ad-hoc event publishing

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::broker::{Broker, BrokerError};
use crate::config::PipelineConfig;
use crate::types::AssetEvent;
use crate::validation::{validate_event, ValidationError};

/// Default bound on a single publish call
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a publish call failed
///
/// Every failure mode surfaces through this one type; the publisher never
/// retries on its own.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid event: {0}")]
    Validation(#[from] ValidationError),
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

impl PublishError {
    /// Whether the caller supplied a bad event (as opposed to a transport failure)
    pub fn is_validation(&self) -> bool {
        matches!(self, PublishError::Validation(_))
    }
}

/// Confirmation that the broker durably stored an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishAck {
    pub queue: String,
    pub asset_id: String,
    pub event_type: String,
    pub bytes: usize,
    pub confirmed_at: DateTime<Utc>,
}

/// Stateless publisher: each call opens its own broker session
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    queue: String,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn Broker>, queue: impl Into<String>) -> Self {
        Self {
            broker,
            queue: queue.into(),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Publisher using the configured queue and timeout
    pub fn from_config(broker: Arc<dyn Broker>, config: &PipelineConfig) -> Self {
        Self::new(broker, config.queue.clone()).with_timeout(config.publish_timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Validate, serialize and durably publish one event
    ///
    /// Validation happens before any network call. The whole broker exchange
    /// (connect, declare, publish, confirm, close) is bounded by the timeout.
    pub async fn publish(&self, event: &AssetEvent) -> Result<PublishAck, PublishError> {
        validate_event(event)?;
        let body = event.to_wire()?;

        tokio::time::timeout(self.timeout, self.send(&body))
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))??;

        info!(
            asset_id = %event.asset_id,
            event_type = %event.event_type,
            queue = %self.queue,
            "event published"
        );
        Ok(PublishAck {
            queue: self.queue.clone(),
            asset_id: event.asset_id.clone(),
            event_type: event.event_type.clone(),
            bytes: body.len(),
            confirmed_at: Utc::now(),
        })
    }

    async fn send(&self, body: &[u8]) -> Result<(), BrokerError> {
        let mut session = self.broker.connect().await?;
        let outcome = async {
            session.declare_queue(&self.queue).await?;
            session.publish(&self.queue, body).await
        }
        .await;

        // Release the connection whatever happened
        if let Err(e) = session.close().await {
            debug!(error = %e, "closing publisher session failed");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use serde_json::json;

    const QUEUE: &str = "asset_events";

    fn publisher(broker: &InMemoryBroker) -> EventPublisher {
        EventPublisher::new(Arc::new(broker.clone()), QUEUE)
    }

    #[tokio::test]
    async fn test_publish_declares_queue_and_enqueues() {
        let broker = InMemoryBroker::new();
        let event = AssetEvent::new("pump-1", "login", json!({"user": "ops"}), "node-a");

        let ack = publisher(&broker).publish(&event).await.unwrap();

        assert_eq!(ack.queue, QUEUE);
        assert_eq!(ack.asset_id, "pump-1");
        assert!(broker.is_declared(QUEUE));
        let bodies = broker.ready_bodies(QUEUE);
        assert_eq!(bodies.len(), 1);
        assert_eq!(ack.bytes, bodies[0].len());
        assert_eq!(AssetEvent::from_wire(&bodies[0]).unwrap(), event);
    }

    #[tokio::test]
    async fn test_invalid_event_fails_before_network() {
        let broker = InMemoryBroker::new();
        let event = AssetEvent::new("", "login", json!({}), "node-a");

        let err = publisher(&broker).publish(&event).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(broker.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_broker_surfaces_error() {
        let broker = InMemoryBroker::new();
        broker.set_reachable(false);
        let event = AssetEvent::new("pump-1", "login", json!({}), "node-a");

        let err = publisher(&broker).publish(&event).await.unwrap_err();

        assert!(matches!(err, PublishError::Broker(BrokerError::Unreachable(_))));
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn test_consecutive_publishes_keep_order() {
        let broker = InMemoryBroker::new();
        let publisher = publisher(&broker);
        for kind in ["boot", "login", "logout"] {
            let event = AssetEvent::new("pump-1", kind, json!(null), "node-a");
            publisher.publish(&event).await.unwrap();
        }

        let kinds: Vec<String> = broker
            .ready_bodies(QUEUE)
            .iter()
            .map(|b| AssetEvent::from_wire(b).unwrap().event_type)
            .collect();
        assert_eq!(kinds, vec!["boot", "login", "logout"]);
    }
}
