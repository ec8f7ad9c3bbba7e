use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lapin::{
    options::*,
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::JobQueue;
use crate::modules::media::events::{
    DeadLetter, JobDescriptor, QueuedJob, DEAD_LETTER_QUEUE, RETRY_QUEUE, TRANSCODE_QUEUE,
};

/// Expired messages in the retry queue are dead-lettered through the default
/// exchange straight back onto the work queue.
fn queue_arguments(queue: &str) -> FieldTable {
    let mut args = FieldTable::default();
    if queue == RETRY_QUEUE {
        args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString("".into()));
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(TRANSCODE_QUEUE.into()),
        );
    }
    args
}

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ at {}", url);
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        info!("✅ Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;

        Ok(Self {
            url: url.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    pub async fn reconnect(&self) -> Result<()> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    async fn declare(channel: &Channel, queue: &str) -> Result<()> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                queue_arguments(queue),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue '{}': {}", queue, e))?;
        Ok(())
    }

    async fn publish_internal(
        &self,
        queue: &str,
        payload: &[u8],
        expiration: Option<Duration>,
    ) -> Result<()> {
        let channel = self.channel.lock().await;

        Self::declare(&channel, queue).await?;

        let mut properties = BasicProperties::default()
            .with_delivery_mode(2) // Persistent
            .with_content_type("application/json".into());
        if let Some(ttl) = expiration {
            properties = properties.with_expiration(ttl.as_millis().to_string().into());
        }

        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        Ok(())
    }

    pub async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.publish_with_expiration(queue, payload, None).await
    }

    async fn publish_with_expiration(
        &self,
        queue: &str,
        payload: &[u8],
        expiration: Option<Duration>,
    ) -> Result<()> {
        if let Err(e) = self.publish_internal(queue, payload, expiration).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(queue, payload, expiration).await?;
        }

        Ok(())
    }

    /// The enqueue call used by the upload flow once a raw file is staged.
    pub async fn enqueue(&self, job: &JobDescriptor) -> Result<()> {
        let payload = serde_json::to_vec(&QueuedJob::first(job.clone()))?;
        self.publish(TRANSCODE_QUEUE, &payload).await?;
        info!(job_id = %job.job_id, media_asset_id = %job.media_asset_id, "📨 Enqueued transcoding job");
        Ok(())
    }


    /// Start consuming `queue`, letting the broker hand out at most
    /// `prefetch` unacked deliveries to this consumer.
    pub async fn consume(&self, queue: &str, consumer_tag: &str, prefetch: u16) -> Result<Consumer> {
        let channel = self.channel.lock().await;

        Self::declare(&channel, queue).await?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set prefetch: {}", e))?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        Ok(consumer)
    }
}

#[async_trait]
impl JobQueue for RabbitMqService {
    async fn requeue(&self, job: &QueuedJob, delay: Duration) -> Result<()> {
        let payload = serde_json::to_vec(job)?;
        if delay.is_zero() {
            return self.publish(TRANSCODE_QUEUE, &payload).await;
        }
        self.publish_with_expiration(RETRY_QUEUE, &payload, Some(delay))
            .await
    }

    async fn dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let payload = serde_json::to_vec(letter)?;
        self.publish(DEAD_LETTER_QUEUE, &payload).await
    }
}
