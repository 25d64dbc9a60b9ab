use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use feedcloud_core::{DatabasePool, Error, Result, Settings};

use crate::tasks;

pub const TASK_QUEUE_NAME: &str = "feedcloud.tasks";

/// A queue message. Both kinds are fire-and-forget; there is no reply
/// channel, and redelivery is domain-driven rather than transport-driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    DownloadFeed { feed_id: i32 },
    NotifyUserOnFailure { feed_id: i32 },
}

pub async fn connect(url: &str) -> Result<Connection> {
    Connection::connect(url, ConnectionProperties::default())
        .await
        .map_err(|e| Error::Queue(e.to_string()))
}

/// Producer half of the task queue. Production uses an AMQP channel; tests
/// and single-process setups use an in-memory channel pair.
#[derive(Clone)]
pub enum Broker {
    Amqp(Channel),
    Memory(mpsc::UnboundedSender<Task>),
}

impl Broker {
    pub async fn amqp(connection: &Connection) -> Result<Self> {
        let channel = create_task_channel(connection).await?;
        Ok(Self::Amqp(channel))
    }

    pub fn memory() -> (Self, TaskConsumer) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::Memory(sender), TaskConsumer::Memory(receiver))
    }

    pub async fn send(&self, task: Task) -> Result<()> {
        match self {
            Self::Amqp(channel) => {
                let payload = serde_json::to_vec(&task)?;
                channel
                    .basic_publish(
                        "",
                        TASK_QUEUE_NAME,
                        BasicPublishOptions::default(),
                        &payload,
                        BasicProperties::default(),
                    )
                    .await
                    .map_err(|e| Error::Queue(e.to_string()))?
                    .await
                    .map_err(|e| Error::Queue(e.to_string()))?;
            }
            Self::Memory(sender) => {
                sender
                    .send(task)
                    .map_err(|_| Error::Queue("task queue is closed".to_string()))?;
            }
        }
        Ok(())
    }
}

/// Consumer half of the task queue.
pub enum TaskConsumer {
    Amqp(lapin::Consumer),
    Memory(mpsc::UnboundedReceiver<Task>),
}

impl TaskConsumer {
    pub async fn amqp(connection: &Connection, consumer_tag: &str) -> Result<Self> {
        let channel = create_task_channel(connection).await?;
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| Error::Queue(e.to_string()))?;
        let consumer = channel
            .basic_consume(
                TASK_QUEUE_NAME,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Queue(e.to_string()))?;
        Ok(Self::Amqp(consumer))
    }

    /// Receive the next task, or `None` once the transport has closed.
    /// AMQP deliveries are acked before execution: a failed attempt is
    /// retried through the worker's own run bookkeeping, never redelivered.
    pub async fn recv(&mut self) -> Option<Task> {
        match self {
            Self::Amqp(consumer) => loop {
                let delivery = match consumer.next().await? {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        tracing::error!("Task delivery failed: {}", e);
                        continue;
                    }
                };
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    tracing::error!("Cannot ack task delivery: {}", e);
                }
                match serde_json::from_slice(&delivery.data) {
                    Ok(task) => return Some(task),
                    Err(e) => {
                        tracing::warn!("Dropping malformed task payload: {}", e);
                        continue;
                    }
                }
            },
            Self::Memory(receiver) => receiver.recv().await,
        }
    }
}

async fn create_task_channel(connection: &Connection) -> Result<Channel> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;
    channel
        .queue_declare(
            TASK_QUEUE_NAME,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;
    Ok(channel)
}

/// Connect the producer side of the queue. Under `IS_TESTING` the in-memory
/// stub replaces AMQP and is drained by a consumer loop spawned in this
/// process. The returned connection must be kept alive as long as the broker
/// is in use.
pub async fn producer(settings: &Settings, pool: &DatabasePool) -> Result<(Broker, Option<Connection>)> {
    if settings.is_testing {
        tracing::info!("Using in-memory broker");
        let (broker, consumer) = Broker::memory();
        tokio::spawn(tasks::run_consumer(
            consumer,
            pool.clone(),
            broker.clone(),
            settings.clone(),
        ));
        Ok((broker, None))
    } else {
        tracing::info!("Using AMQP broker");
        let connection = connect(&settings.broker_url).await?;
        let broker = Broker::amqp(&connection).await?;
        Ok((broker, Some(connection)))
    }
}
