//! Queue consumer and connection manager
//!
//! The [`ConnectionManager`] owns the collector's only broker session and the
//! aggregator writer. It drives the connection state machine:
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌───────────┐
//! │ Disconnected │──►│ Connecting │──►│ Connected │──── transport failure ───┐
//! └──────────────┘   └────────────┘   └───────────┘                          │
//!                          ▲   │ failure                                      ▼
//!                          │   └────────────────────────────────────►┌──────────────┐
//!                          └────────────── backoff elapsed ──────────│ Reconnecting │
//!                                                                    └──────────────┘
//! shutdown signal (any state) ──► ShuttingDown ──► Closed
//! ```
//!
//! Deliveries are handled one at a time: decode, fold, ack. The prefetch window
//! bounds how many deliveries the broker pushes ahead of processing.

mod backoff;
mod state;

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::broker::{Broker, BrokerError, BrokerResult, BrokerSession, Delivery, DeliveryStream};
use crate::config::PipelineConfig;

pub use backoff::BackoffPolicy;
pub use state::ConnectionState;

/// Queue-level settings for the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Durable queue to consume from
    pub queue: String,
    /// Maximum unacknowledged deliveries
    pub prefetch: u16,
    /// Consumer tag announced to the broker
    pub consumer_tag: String,
    /// Where undecodable bodies are forwarded before being acked
    pub dead_letter_queue: Option<String>,
}

impl ConsumerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            queue: config.queue.clone(),
            prefetch: config.prefetch,
            consumer_tag: format!("asset-collector-{}", std::process::id()),
            dead_letter_queue: config.dead_letter_queue.clone(),
        }
    }
}

/// Why a connected session stopped
enum SessionEnd {
    Shutdown,
    Lost(BrokerError),
}

/// Maintains the consumer's link to the broker and feeds the aggregator
pub struct ConnectionManager {
    broker: Arc<dyn Broker>,
    settings: ConsumerSettings,
    backoff: BackoffPolicy,
    aggregator: Aggregator,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        broker: Arc<dyn Broker>,
        settings: ConsumerSettings,
        backoff: BackoffPolicy,
        aggregator: Aggregator,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            broker,
            settings,
            backoff,
            aggregator,
            state_tx,
        }
    }

    /// Subscribe to connection state changes
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "connection state changed");
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped)
    ///
    /// Transport failures never end this loop; it reconnects with backoff for
    /// as long as the process runs.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.transition(ConnectionState::Connecting);
            let opened = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                opened = self.open_session() => opened,
            };

            match opened {
                Ok((mut session, deliveries)) => {
                    attempt = 0;
                    self.transition(ConnectionState::Connected);
                    info!(
                        endpoint = %self.broker.describe(),
                        queue = %self.settings.queue,
                        prefetch = self.settings.prefetch,
                        "consuming events"
                    );

                    match self.consume(&mut session, deliveries, &mut shutdown).await {
                        SessionEnd::Shutdown => {
                            self.transition(ConnectionState::ShuttingDown);
                            if let Err(e) = session.close().await {
                                warn!(error = %e, "error while closing broker session");
                            }
                            self.transition(ConnectionState::Closed);
                            return;
                        }
                        SessionEnd::Lost(e) => {
                            warn!(error = %e, "lost connection to broker");
                            if let Err(e) = session.close().await {
                                debug!(error = %e, "closing dead session failed");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        endpoint = %self.broker.describe(),
                        attempt,
                        error = %e,
                        "connection attempt failed"
                    );
                }
            }

            self.transition(ConnectionState::Reconnecting);
            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(delay_ms = delay.as_millis() as u64, attempt, "waiting before reconnect");

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(ConnectionState::ShuttingDown);
        self.transition(ConnectionState::Closed);
    }

    /// Connect, declare queues, set QoS and start consuming
    async fn open_session(&self) -> BrokerResult<(Box<dyn BrokerSession>, DeliveryStream)> {
        let mut session = self.broker.connect().await?;
        match self.prepare(session.as_mut()).await {
            Ok(deliveries) => Ok((session, deliveries)),
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    debug!(error = %close_err, "closing half-open session failed");
                }
                Err(e)
            }
        }
    }

    async fn prepare(&self, session: &mut dyn BrokerSession) -> BrokerResult<DeliveryStream> {
        session.declare_queue(&self.settings.queue).await?;
        if let Some(dlq) = &self.settings.dead_letter_queue {
            session.declare_queue(dlq).await?;
        }
        session.set_prefetch(self.settings.prefetch).await?;
        session
            .consume(&self.settings.queue, &self.settings.consumer_tag)
            .await
    }

    async fn consume(
        &mut self,
        session: &mut Box<dyn BrokerSession>,
        mut deliveries: DeliveryStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            // Shutdown is only observed between deliveries, so the one in
            // progress is always folded and acked first
            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return SessionEnd::Lost(e),
                None => return SessionEnd::Lost(BrokerError::ConnectionLost),
            };

            if let Err(e) = self.handle(session.as_mut(), delivery).await {
                return SessionEnd::Lost(e);
            }
        }
    }

    async fn handle(&mut self, session: &mut dyn BrokerSession, delivery: Delivery) -> BrokerResult<()> {
        if delivery.redelivered {
            debug!(delivery_tag = delivery.delivery_tag, "processing redelivered message");
        }

        if self.aggregator.ingest(&delivery.body).is_err() {
            // Unparseable payloads can never succeed on redelivery: drop them
            if let Some(dlq) = &self.settings.dead_letter_queue {
                match session.publish(dlq, &delivery.body).await {
                    Ok(()) => info!(queue = %dlq, "malformed message dead-lettered"),
                    Err(e) => warn!(queue = %dlq, error = %e, "failed to dead-letter malformed message"),
                }
            }
        }

        delivery.ack().await
    }
}

/// Resolve once the shutdown flag is set or its sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
