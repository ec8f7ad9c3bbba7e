use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use super::client::RedisService;
use crate::pipeline::progress::ProgressReporter;

// Monitoring only needs the value while a job is alive
const PROGRESS_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct RedisProgress {
    redis: RedisService,
}

impl RedisProgress {
    pub fn new(redis: RedisService) -> Self {
        Self { redis }
    }

    fn key(job_id: Uuid) -> String {
        format!("transcode:progress:{}", job_id)
    }

    pub async fn ping(&self) -> Result<()> {
        self.redis.ping().await?;
        Ok(())
    }

    pub async fn read(&self, job_id: Uuid) -> Result<Option<u8>> {
        let mut conn = self.redis.get_conn().await?;
        let value: Option<u8> = conn.get(Self::key(job_id)).await?;
        Ok(value)
    }
}

#[async_trait]
impl ProgressReporter for RedisProgress {
    async fn report(&self, job_id: Uuid, percent: u8) -> Result<()> {
        let mut conn = self.redis.get_conn().await?;
        let _: () = conn.set_ex(Self::key(job_id), percent, PROGRESS_TTL_SECS).await?;
        Ok(())
    }
}
