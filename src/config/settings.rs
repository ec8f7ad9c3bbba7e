use std::path::PathBuf;
use std::time::Duration;
use crate::config::env::{self, EnvKey};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub rabbitmq_url: String,
    pub minio_url: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub public_base_url: Option<String>,
    pub staging_root: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub transcoder_workers: usize,
    pub variant_concurrency: usize,
    pub upload_concurrency: usize,
    pub job_timeout_secs: u64,
    pub max_attempts: u32,
    pub stale_processing_secs: u64,
    pub reaper_interval_secs: u64,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get(EnvKey::DatabaseUrl)?,
            redis_url: env::get(EnvKey::RedisUrl)?,
            rabbitmq_url: env::get(EnvKey::RabbitMqUrl)?,
            minio_url: env::get(EnvKey::MinioUrl)?,
            minio_bucket: env::get(EnvKey::MinioBucket)?,
            minio_access_key: env::get(EnvKey::MinioAccessKey)?,
            minio_secret_key: env::get(EnvKey::MinioSecretKey)?,
            public_base_url: env::get_opt(EnvKey::PublicBaseUrl),
            staging_root: PathBuf::from(env::get_or(EnvKey::StagingRoot, "/tmp/transcode")),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            ffprobe_path: env::get_or(EnvKey::FfprobePath, "ffprobe"),
            transcoder_workers: env::get_parsed(EnvKey::TranscoderWorkers, 2usize).max(1),
            variant_concurrency: env::get_parsed(EnvKey::VariantConcurrency, 1usize).max(1),
            upload_concurrency: env::get_parsed(EnvKey::UploadConcurrency, 8usize).max(1),
            job_timeout_secs: env::get_parsed(EnvKey::JobTimeoutSecs, 3600),
            max_attempts: env::get_parsed(EnvKey::MaxAttempts, 3u32).max(1),
            stale_processing_secs: env::get_parsed(EnvKey::StaleProcessingSecs, 7200),
            reaper_interval_secs: env::get_parsed(EnvKey::ReaperIntervalSecs, 300),
        })
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn stale_processing_after(&self) -> Duration {
        Duration::from_secs(self.stale_processing_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}
