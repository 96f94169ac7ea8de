//! Durable queue broker abstraction
//!
//! The pipeline only relies on the publish/consume/ack contract of a durable,
//! at-least-once queue. That contract is expressed by two traits:
//!
//! - [`Broker`]: opens sessions (one connection + one channel)
//! - [`BrokerSession`]: declares queues, sets QoS, publishes and consumes
//!
//! Two implementations are provided:
//!
//! - [`AmqpBroker`]: RabbitMQ / AMQP 0-9-1 through `lapin`
//! - [`InMemoryBroker`]: in-process queue with the same redelivery semantics
//!
//! ```text
//! Producer ──publish──► [ durable queue ] ──deliver (≤ prefetch unacked)──► Consumer
//!                              ▲                                              │
//!                              └──────────── redeliver unacked on drop ◄──────┘
//! ```

mod amqp;
mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use amqp::AmqpBroker;
pub use memory::InMemoryBroker;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Transport-level failures reported by a broker implementation
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    #[error("connection lost")]
    ConnectionLost,
    #[error("queue '{0}' is not declared")]
    QueueNotDeclared(String),
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),
    #[error("broker rejected message on '{0}'")]
    Nacked(String),
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}

/// A message handed to a consumer, acknowledged through its [`Acker`]
pub struct Delivery {
    /// Broker-assigned delivery tag, unique per session
    pub delivery_tag: u64,
    /// Whether the broker delivered this message before
    pub redelivered: bool,
    /// Raw message body
    pub body: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub(crate) fn new(
        delivery_tag: u64,
        redelivered: bool,
        body: Vec<u8>,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            delivery_tag,
            redelivered,
            body,
            acker,
        }
    }

    /// Acknowledge the message, removing it permanently from the queue
    pub async fn ack(self) -> BrokerResult<()> {
        self.acker.ack().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Acknowledgement handle attached to a delivery
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> BrokerResult<()>;
}

/// Stream of deliveries; an `Err` item or end of stream means the session is gone
pub type DeliveryStream = BoxStream<'static, BrokerResult<Delivery>>;

/// Factory for broker sessions
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a new connection and channel
    async fn connect(&self) -> BrokerResult<Box<dyn BrokerSession>>;

    /// Human readable endpoint (credentials masked)
    fn describe(&self) -> String;
}

/// One connection plus one channel to the broker
#[async_trait]
pub trait BrokerSession: Send {
    /// Declare a durable queue; declaring an existing queue is a no-op
    async fn declare_queue(&mut self, queue: &str) -> BrokerResult<()>;

    /// Bound the number of unacknowledged deliveries on this channel
    async fn set_prefetch(&mut self, count: u16) -> BrokerResult<()>;

    /// Publish a persistent message and wait for the broker to confirm it
    async fn publish(&mut self, queue: &str, body: &[u8]) -> BrokerResult<()>;

    /// Start consuming from a queue with manual acknowledgements
    async fn consume(&mut self, queue: &str, consumer_tag: &str) -> BrokerResult<DeliveryStream>;

    /// Release the channel and the connection
    async fn close(self: Box<Self>) -> BrokerResult<()>;
}
