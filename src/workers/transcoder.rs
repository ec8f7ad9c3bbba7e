use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::queue::JobQueue;
use crate::modules::media::events::{DeadLetter, QueuedJob, TRANSCODE_QUEUE};
use crate::pipeline::{ProcessingError, TranscodePipeline};
use async_channel::Receiver;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::BasicAckOptions;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CONSUMER_TAG: &str = "transcoder_worker";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_BACKOFF_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub job_timeout: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry { delay: Duration },
    DeadLetter,
    /// The job is already running here; the running copy owns the outcome.
    Skip,
}

/// What became of one delivery. The delivery is acked in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Requeued { attempt: u32, delay: Duration },
    DeadLettered,
    Skipped,
}

/// `failed` is terminal for an asset, so only transient database errors are
/// worth another attempt. Everything else goes to the dead-letter queue.
pub fn disposition(err: &ProcessingError, attempt: u32, max_attempts: u32) -> Disposition {
    if matches!(err, ProcessingError::AlreadyRunning(_)) {
        return Disposition::Skip;
    }

    let transient = matches!(err, ProcessingError::State(e) if e.is_transient());

    if transient && attempt + 1 < max_attempts {
        let delay = 2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS);
        Disposition::Retry {
            delay: Duration::from_secs(delay),
        }
    } else {
        Disposition::DeadLetter
    }
}

/// Consume `transcoding_tasks` and fan deliveries out to `concurrency`
/// workers. Each job is owned by exactly one worker until it is acked.
pub async fn start_transcoder_worker(
    queue: RabbitMqService,
    pipeline: TranscodePipeline,
    config: WorkerConfig,
    shutdown: CancellationToken,
) {
    info!("🎥 Starting Transcoder Worker with {} slots...", config.concurrency);

    let (tx, rx) = async_channel::bounded::<Delivery>(config.concurrency);
    let handles: Vec<_> = (0..config.concurrency)
        .map(|slot| {
            tokio::spawn(run_slot(
                slot,
                rx.clone(),
                queue.clone(),
                pipeline.clone(),
                config.clone(),
            ))
        })
        .collect();
    drop(rx);

    let prefetch = u16::try_from(config.concurrency).unwrap_or(u16::MAX);

    'consume: while !shutdown.is_cancelled() {
        let mut consumer = match queue.consume(TRANSCODE_QUEUE, CONSUMER_TAG, prefetch).await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!("Failed to start consumer: {}", e);
                tokio::select! {
                    _ = shutdown.cancelled() => break 'consume,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
                if let Err(e) = queue.reconnect().await {
                    error!("RabbitMQ reconnect failed: {}", e);
                }
                continue;
            }
        };

        info!("🎥 Transcoder Worker listening on '{}'", TRANSCODE_QUEUE);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break 'consume,
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => {
                        if tx.send(delivery).await.is_err() {
                            break 'consume;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Consumer error: {}", e);
                        break;
                    }
                    None => {
                        warn!("Consumer stream ended");
                        break;
                    }
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break 'consume,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
        if let Err(e) = queue.reconnect().await {
            error!("RabbitMQ reconnect failed: {}", e);
        }
    }

    // Let in-flight jobs reach a terminal state before returning
    tx.close();
    for handle in handles {
        let _ = handle.await;
    }
    info!("🎥 Transcoder Worker stopped");
}

async fn run_slot(
    slot: usize,
    deliveries: Receiver<Delivery>,
    queue: RabbitMqService,
    pipeline: TranscodePipeline,
    config: WorkerConfig,
) {
    while let Ok(delivery) = deliveries.recv().await {
        info!(slot, "📦 Received transcoding job");
        handle_job(&delivery.data, &queue, &pipeline, &config).await;

        // Retries and dead letters are republished before the original is acked
        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            error!("Failed to ack message: {}", e);
        }
    }
}

/// Run one queued payload to a terminal outcome. Never sleeps: retries are
/// delayed by the broker.
pub async fn handle_job(
    payload: &[u8],
    queue: &dyn JobQueue,
    pipeline: &TranscodePipeline,
    config: &WorkerConfig,
) -> JobOutcome {
    let queued = match serde_json::from_slice::<QueuedJob>(payload) {
        Ok(queued) => queued,
        Err(e) => {
            error!("❌ Failed to parse job: {}", e);
            dead_letter(
                queue,
                DeadLetter {
                    job: None,
                    error: format!("malformed payload: {}", e),
                    payload: Some(String::from_utf8_lossy(payload).into_owned()),
                },
            )
            .await;
            return JobOutcome::DeadLettered;
        }
    };
    let job = &queued.job;

    let err = match tokio::time::timeout(config.job_timeout, pipeline.run(job)).await {
        Ok(Ok(outcome)) => {
            info!(job_id = %job.job_id, hls_url = %outcome.urls.hls_url, "✅ Job completed successfully");
            return JobOutcome::Completed;
        }
        Ok(Err(err)) => err,
        Err(_) => {
            let reason = format!(
                "job exceeded the {}s processing time limit",
                config.job_timeout.as_secs()
            );
            pipeline.abort(job, &reason).await;
            dead_letter(
                queue,
                DeadLetter {
                    job: Some(queued.clone()),
                    error: reason,
                    payload: None,
                },
            )
            .await;
            return JobOutcome::DeadLettered;
        }
    };

    match disposition(&err, queued.attempt, config.max_attempts) {
        Disposition::Skip => JobOutcome::Skipped,
        Disposition::Retry { delay } => {
            let next = queued.next_attempt();
            warn!(
                job_id = %job.job_id,
                attempt = next.attempt,
                delay_secs = delay.as_secs(),
                "🔁 Requeueing job after transient failure: {}", err
            );
            match queue.requeue(&next, delay).await {
                Ok(()) => JobOutcome::Requeued {
                    attempt: next.attempt,
                    delay,
                },
                Err(e) => {
                    error!(job_id = %job.job_id, "Failed to requeue job: {}", e);
                    dead_letter(
                        queue,
                        DeadLetter {
                            job: Some(queued.clone()),
                            error: err.detail(),
                            payload: None,
                        },
                    )
                    .await;
                    JobOutcome::DeadLettered
                }
            }
        }
        Disposition::DeadLetter => {
            dead_letter(
                queue,
                DeadLetter {
                    job: Some(queued.clone()),
                    error: err.detail(),
                    payload: None,
                },
            )
            .await;
            JobOutcome::DeadLettered
        }
    }
}

async fn dead_letter(queue: &dyn JobQueue, letter: DeadLetter) {
    if let Err(e) = queue.dead_letter(&letter).await {
        error!("Failed to dead-letter job: {}", e);
    } else {
        warn!("☠️ Job dead-lettered: {}", letter.error);
    }
}
