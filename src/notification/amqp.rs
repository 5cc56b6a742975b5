//! RabbitMQ transport for the email queue.
//!
//! The queue is durable and dead-letters through the default exchange into
//! `<queue>.dead`. Messages are published persistent with publisher confirms, and
//! consumed with manual acknowledgement and a prefetch of one.

use async_trait::async_trait;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};

use super::consumer::{HandleOutcome, InboundDelivery};
use super::{NotificationChannel, NotificationError, NotificationMessage};

const PERSISTENT: u8 = 2;

fn broker_error(context: &str, error: lapin::Error) -> NotificationError {
    NotificationError::Broker(format!("{}: {}", context, error))
}

pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dead", queue)
}

/// Declaration arguments routing rejected messages to the dead-letter queue.
pub fn queue_arguments(queue: &str) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from("")),
    );
    args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(dead_letter_queue(queue))),
    );
    args
}

/// A broker connection bound to one email queue.
pub struct AmqpBroker {
    connection: Connection,
    queue: String,
}

impl AmqpBroker {
    pub async fn connect(url: &str, queue: &str) -> Result<Self, NotificationError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| broker_error("connect", e))?;
        log::info!("connected to broker, email queue {:?}", queue);
        Ok(Self {
            connection,
            queue: queue.to_string(),
        })
    }

    async fn channel(&self) -> Result<Channel, NotificationError> {
        self.connection
            .create_channel()
            .await
            .map_err(|e| broker_error("create channel", e))
    }

    /// Declares the email queue and its dead-letter queue. Safe to repeat.
    pub async fn declare(&self) -> Result<(), NotificationError> {
        let channel = self.channel().await?;
        let durable = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };

        channel
            .queue_declare(&dead_letter_queue(&self.queue), durable, FieldTable::default())
            .await
            .map_err(|e| broker_error("declare dead-letter queue", e))?;
        channel
            .queue_declare(&self.queue, durable, queue_arguments(&self.queue))
            .await
            .map_err(|e| broker_error("declare queue", e))?;
        Ok(())
    }

    pub async fn publisher(&self) -> Result<AmqpPublisher, NotificationError> {
        let channel = self.channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| broker_error("enable confirms", e))?;
        Ok(AmqpPublisher {
            channel,
            queue: self.queue.clone(),
        })
    }

    /// Starts a manual-ack consumer that holds at most one unsettled delivery.
    pub async fn consume(&self, tag: &str) -> Result<Consumer, NotificationError> {
        let channel = self.channel().await?;
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| broker_error("set prefetch", e))?;
        channel
            .basic_consume(
                &self.queue,
                tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| broker_error("start consumer", e))
    }
}

pub struct AmqpPublisher {
    channel: Channel,
    queue: String,
}

#[async_trait]
impl NotificationChannel for AmqpPublisher {
    async fn publish(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        let body = message.encode()?;
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type(ShortString::from("application/json"));

        let confirmation = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| broker_error("publish", e))?
            .await
            .map_err(|e| broker_error("publish confirm", e))?;

        if confirmation.is_nack() {
            return Err(NotificationError::Broker(format!(
                "broker refused {} message",
                message.kind()
            )));
        }
        log::debug!("published {} to {}", message.kind(), self.queue);
        Ok(())
    }
}

#[async_trait]
impl InboundDelivery for Delivery {
    fn body(&self) -> &[u8] {
        &self.data
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn settle(&self, outcome: HandleOutcome) -> Result<(), NotificationError> {
        let result = match outcome {
            HandleOutcome::Ack => self.acker.ack(BasicAckOptions::default()).await.map(|_| ()),
            HandleOutcome::Nack { requeue } => self
                .acker
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue,
                })
                .await
                .map(|_| ()),
            HandleOutcome::DeadLetter => self
                .acker
                .reject(BasicRejectOptions { requeue: false })
                .await
                .map(|_| ()),
        };
        result.map_err(|e| broker_error("settle delivery", e))
    }
}
