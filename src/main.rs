use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use transcoder::app;
use transcoder::config::settings::AppConfig;
use transcoder::infrastructure::db::pool::{connect_to_db, run_migrations};
use transcoder::infrastructure::queue::rabbitmq::RabbitMqService;
use transcoder::infrastructure::redis::client::RedisService;
use transcoder::infrastructure::redis::progress::RedisProgress;
use transcoder::infrastructure::storage::s3::StorageService;
use transcoder::modules::media::repository::MediaAssetRepository;
use transcoder::pipeline::{FfmpegEncoder, PipelineConfig, TranscodePipeline};
use transcoder::state::AppState;
use transcoder::workers::reaper::start_stale_reaper;
use transcoder::workers::transcoder::{start_transcoder_worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting transcoder...");

    let config = AppConfig::new().context("Missing required environment variable")?;

    let db = connect_to_db(&config.database_url, config.transcoder_workers as u32 + 4).await?;
    run_migrations(&db).await?;

    let redis = RedisService::new(&config.redis_url).await?;
    let progress = RedisProgress::new(redis);

    let storage = StorageService::new(
        &config.minio_url,
        &config.minio_bucket,
        &config.minio_access_key,
        &config.minio_secret_key,
        config.public_base_url.as_deref(),
    )
    .await?;
    storage.check_bucket().await?;

    let queue = RabbitMqService::new(&config.rabbitmq_url).await?;
    let encoder = FfmpegEncoder::locate(&config.ffmpeg_path, &config.ffprobe_path)?;

    let assets = Arc::new(MediaAssetRepository::new(db.clone()));
    let pipeline = TranscodePipeline::new(
        Arc::new(encoder),
        Arc::new(storage),
        assets.clone(),
        Arc::new(progress.clone()),
        PipelineConfig {
            variant_concurrency: config.variant_concurrency,
            upload_concurrency: config.upload_concurrency,
            ..PipelineConfig::new(config.staging_root.clone())
        },
    )?;

    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(start_transcoder_worker(
        queue,
        pipeline,
        WorkerConfig {
            concurrency: config.transcoder_workers,
            job_timeout: config.job_timeout(),
            max_attempts: config.max_attempts,
        },
        shutdown.clone(),
    ));
    let reaper = tokio::spawn(start_stale_reaper(
        assets,
        config.stale_processing_after(),
        config.reaper_interval(),
        shutdown.clone(),
    ));

    let port = config.server_port;
    let state = AppState::new(config, db, progress);
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server running on http://0.0.0.0:{}", port);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("🛑 Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = tokio::join!(worker, reaper);
    info!("👋 Transcoder stopped");
    Ok(())
}
