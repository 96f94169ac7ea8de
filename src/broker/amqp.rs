//! AMQP 0-9-1 broker backed by `lapin`

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::debug;

use super::{Acker, Broker, BrokerError, BrokerResult, BrokerSession, Delivery, DeliveryStream};
use crate::config::BrokerConfig;

/// AMQP delivery mode for messages that survive a broker restart
const PERSISTENT: u8 = 2;

/// Reply code sent when closing channels and connections normally
const REPLY_SUCCESS: u16 = 200;

/// RabbitMQ-compatible broker
pub struct AmqpBroker {
    uri: String,
    redacted: String,
}

impl AmqpBroker {
    /// Create a broker for the given connection parameters
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            uri: config.uri(),
            redacted: config.redacted_uri(),
        }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(&self) -> BrokerResult<Box<dyn BrokerSession>> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Unreachable(format!("{}: {}", self.redacted, e)))?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        debug!(endpoint = %self.redacted, channel = channel.id(), "amqp session opened");
        Ok(Box::new(AmqpSession {
            connection,
            channel,
        }))
    }

    fn describe(&self) -> String {
        self.redacted.clone()
    }
}

struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn declare_queue(&mut self, queue: &str) -> BrokerResult<()> {
        let options = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        self.channel
            .queue_declare(queue, options, FieldTable::default())
            .await?;
        Ok(())
    }

    async fn set_prefetch(&mut self, count: u16) -> BrokerResult<()> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await?;
        Ok(())
    }

    async fn publish(&mut self, queue: &str, body: &[u8]) -> BrokerResult<()> {
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());

        // Default exchange routes by queue name
        let confirm = self
            .channel
            .basic_publish("", queue, BasicPublishOptions::default(), body, properties)
            .await?
            .await?;

        if confirm.is_nack() {
            return Err(BrokerError::Nacked(queue.to_string()));
        }
        Ok(())
    }

    async fn consume(&mut self, queue: &str, consumer_tag: &str) -> BrokerResult<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let stream = consumer.map(|item| {
            item.map(|delivery| {
                let tag = delivery.delivery_tag;
                let redelivered = delivery.redelivered;
                Delivery::new(
                    tag,
                    redelivered,
                    delivery.data,
                    Box::new(AmqpAcker(delivery.acker)),
                )
            })
            .map_err(BrokerError::from)
        });
        Ok(stream.boxed())
    }

    async fn close(self: Box<Self>) -> BrokerResult<()> {
        let AmqpSession {
            connection,
            channel,
        } = *self;
        channel.close(REPLY_SUCCESS, "bye").await?;
        connection.close(REPLY_SUCCESS, "bye").await?;
        Ok(())
    }
}

struct AmqpAcker(lapin::acker::Acker);

#[async_trait]
impl Acker for AmqpAcker {
    async fn ack(&self) -> BrokerResult<()> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }
}
