pub mod rabbitmq;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::modules::media::events::{DeadLetter, QueuedJob};

/// Outbound side of the transcoding queue used by the workers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish `job` again so it is redelivered after `delay`.
    async fn requeue(&self, job: &QueuedJob, delay: Duration) -> Result<()>;

    async fn dead_letter(&self, letter: &DeadLetter) -> Result<()>;
}
