use anyhow::anyhow;
use futures_util::{stream, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::fs;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cleanup::{cleanup, remove_staging_dir, staging_dir};
use super::encoder::MediaEncoder;
use super::error::{ProcessingError, ProcessingResult};
use super::ladder::{default_ladder, validate_ladder, Variant};
use super::manifest::{compose_master_manifest, MASTER_PLAYLIST_NAME};
use super::progress::{variant_progress, ProgressReporter, ProgressTracker};
use super::thumbnail::{extract_thumbnails, BLURRED_NAME, POSTER_NAME};
use super::transcode::{transcode_variant, validate_source};
use super::uploader::{object_key, upload_tree, HLS_EXTENSIONS};
use crate::infrastructure::storage::ObjectStore;
use crate::modules::media::events::JobDescriptor;
use crate::modules::media::model::{ArtifactUrls, MediaAsset, MediaKind, ProcessingStatus};
use crate::modules::media::repository::{MediaAssetStore, StateError};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub staging_root: PathBuf,
    pub ladder: Vec<Variant>,
    pub variant_concurrency: usize,
    pub upload_concurrency: usize,
}

impl PipelineConfig {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            ladder: default_ladder(),
            variant_concurrency: 1,
            upload_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    pub job_id: Uuid,
    pub media_asset_id: Uuid,
    pub urls: ArtifactUrls,
    pub uploaded_objects: Vec<String>,
}

/// Storage prefix every artifact of a job is uploaded under.
pub fn key_prefix(owner_content_id: Uuid, job_id: Uuid) -> String {
    format!("{}/videos/{}", owner_content_id, job_id)
}

/// Job ids currently running in this process.
#[derive(Default)]
struct InFlight(Mutex<HashSet<Uuid>>);

impl InFlight {
    fn enter(&self, job_id: Uuid) -> Option<InFlightGuard<'_>> {
        let inserted = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id);
        inserted.then(|| InFlightGuard { set: self, job_id })
    }
}

/// Releases the job id when the run finishes or its future is dropped.
struct InFlightGuard<'a> {
    set: &'a InFlight,
    job_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

/// Runs one job end to end. Never retries: every failure is recorded on the
/// media asset and returned so the queue layer can decide what happens next.
/// A job id already running in this process is refused, so a redelivered
/// message can never share the staging directory of the run it duplicates.
#[derive(Clone)]
pub struct TranscodePipeline {
    encoder: Arc<dyn MediaEncoder>,
    storage: Arc<dyn ObjectStore>,
    assets: Arc<dyn MediaAssetStore>,
    progress: Arc<dyn ProgressReporter>,
    config: Arc<PipelineConfig>,
    in_flight: Arc<InFlight>,
}

impl TranscodePipeline {
    pub fn new(
        encoder: Arc<dyn MediaEncoder>,
        storage: Arc<dyn ObjectStore>,
        assets: Arc<dyn MediaAssetStore>,
        progress: Arc<dyn ProgressReporter>,
        config: PipelineConfig,
    ) -> anyhow::Result<Self> {
        validate_ladder(&config.ladder).map_err(|e| anyhow!("Invalid variant ladder: {}", e))?;

        Ok(Self {
            encoder,
            storage,
            assets,
            progress,
            config: Arc::new(config),
            in_flight: Arc::default(),
        })
    }

    pub async fn run(&self, job: &JobDescriptor) -> ProcessingResult<ProcessingOutcome> {
        // Touches neither the asset nor the staging area of the running copy
        let Some(_running) = self.in_flight.enter(job.job_id) else {
            warn!(job_id = %job.job_id, "⏭️ Job is already running, skipping duplicate delivery");
            return Err(ProcessingError::AlreadyRunning(job.job_id));
        };

        let started = Instant::now();
        info!(
            job_id = %job.job_id,
            media_asset_id = %job.media_asset_id,
            source = %job.source_path.display(),
            "🎥 Starting transcoding job"
        );

        let mut progress = ProgressTracker::new(self.progress.as_ref(), job.job_id);

        // Without a claim the asset and the source may belong to another job
        let asset = match self.claim(job).await {
            Ok(asset) => asset,
            Err(err) => {
                error!(job_id = %job.job_id, "❌ Could not claim media asset: {}", err);
                remove_staging_dir(&self.config.staging_root, job.job_id).await;
                return Err(err);
            }
        };
        progress.advance(5).await;

        match self.process(job, &asset, &mut progress).await {
            Ok(outcome) => {
                progress.advance(100).await;
                cleanup(&self.config.staging_root, job).await;
                info!(
                    job_id = %job.job_id,
                    objects = outcome.uploaded_objects.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "✅ Transcoding job completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    job_id = %job.job_id,
                    kind = err.kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "❌ Transcoding job failed: {}", err
                );
                self.record_failure(job, &err.detail()).await;
                cleanup(&self.config.staging_root, job).await;
                Err(err)
            }
        }
    }

    /// Terminal bookkeeping for a job whose `run` future was dropped.
    pub async fn abort(&self, job: &JobDescriptor, reason: &str) {
        warn!(job_id = %job.job_id, "⏹️ Aborting transcoding job: {}", reason);
        self.record_failure(job, reason).await;
        cleanup(&self.config.staging_root, job).await;
    }

    async fn claim(&self, job: &JobDescriptor) -> ProcessingResult<MediaAsset> {
        let asset = self
            .assets
            .find(job.media_asset_id)
            .await?
            .ok_or(StateError::NotFound(job.media_asset_id))?;

        if asset.processing_status.is_terminal() {
            return Err(StateError::Conflict {
                id: asset.id,
                status: asset.processing_status,
                target: ProcessingStatus::Processing,
            }
            .into());
        }

        if asset.owner_content_id != job.owner_content_id {
            warn!(
                job_id = %job.job_id,
                job_owner = %job.owner_content_id,
                asset_owner = %asset.owner_content_id,
                "Job owner differs from media asset owner, using the asset's"
            );
        }

        self.assets
            .mark_processing(job.media_asset_id, job.job_id)
            .await?;
        Ok(asset)
    }

    async fn process(
        &self,
        job: &JobDescriptor,
        asset: &MediaAsset,
        progress: &mut ProgressTracker<'_>,
    ) -> ProcessingResult<ProcessingOutcome> {
        if asset.kind != MediaKind::Video {
            return Err(ProcessingError::input(format!(
                "media asset {} is an {}, not a video",
                asset.id,
                asset.kind.as_str()
            )));
        }

        let output_dir = self.prepare_staging(job.job_id).await?;

        validate_source(&job.source_path).await?;
        let info = self.encoder.probe(&job.source_path).await?;
        info!(
            job_id = %job.job_id,
            resolution = %format!("{}x{}", info.width, info.height),
            duration = info.duration_seconds.unwrap_or_default(),
            "Source probed"
        );
        progress.advance(10).await;

        self.transcode_ladder(&job.source_path, &output_dir, progress)
            .await?;

        compose_master_manifest(&output_dir, &self.config.ladder).await?;
        progress.advance(75).await;

        let thumbnails =
            extract_thumbnails(self.encoder.as_ref(), &job.source_path, &info, &output_dir).await?;
        progress.advance(85).await;

        let prefix = key_prefix(asset.owner_content_id, job.job_id);
        let mut uploaded = upload_tree(
            self.storage.as_ref(),
            &output_dir,
            &prefix,
            HLS_EXTENSIONS,
            self.config.upload_concurrency,
        )
        .await?;
        let thumbnail_url = self
            .upload_image(&prefix, &thumbnails.poster, POSTER_NAME)
            .await?;
        let blur_thumbnail_url = self
            .upload_image(&prefix, &thumbnails.blurred, BLURRED_NAME)
            .await?;
        uploaded.push(thumbnail_url.clone());
        uploaded.push(blur_thumbnail_url.clone());
        progress.advance(95).await;

        let urls = ArtifactUrls {
            hls_url: self
                .storage
                .public_url(&object_key(&prefix, MASTER_PLAYLIST_NAME)),
            thumbnail_url,
            blur_thumbnail_url,
        };
        self.assets
            .mark_ready(job.media_asset_id, job.job_id, &urls)
            .await?;

        Ok(ProcessingOutcome {
            job_id: job.job_id,
            media_asset_id: job.media_asset_id,
            urls,
            uploaded_objects: uploaded,
        })
    }

    /// Start every run from an empty staging directory; nothing from an
    /// earlier attempt is reused.
    async fn prepare_staging(&self, job_id: Uuid) -> ProcessingResult<PathBuf> {
        let dir = staging_dir(&self.config.staging_root, job_id);
        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    async fn transcode_ladder(
        &self,
        source: &Path,
        output_dir: &Path,
        progress: &mut ProgressTracker<'_>,
    ) -> ProcessingResult<()> {
        let ladder = &self.config.ladder;
        let encoder = self.encoder.as_ref();

        // Built up front so the run future stays Send
        let encodes: Vec<_> = ladder
            .iter()
            .enumerate()
            .map(|(index, variant)| transcode_variant(encoder, source, index, variant, output_dir))
            .collect();

        // Dropping the stream on the first error kills the encodes still running
        let mut encodes =
            stream::iter(encodes).buffer_unordered(self.config.variant_concurrency.max(1));

        let mut done = 0;
        while let Some(result) = encodes.next().await {
            result?;
            done += 1;
            progress.advance(variant_progress(done, ladder.len())).await;
        }

        Ok(())
    }

    async fn upload_image(&self, prefix: &str, path: &Path, name: &str) -> ProcessingResult<String> {
        let key = object_key(prefix, name);
        self.storage
            .put_file(&key, path, mime::IMAGE_JPEG.as_ref())
            .await?;
        Ok(self.storage.public_url(&key))
    }

    async fn record_failure(&self, job: &JobDescriptor, detail: &str) {
        if let Err(e) = self
            .assets
            .mark_failed(job.media_asset_id, job.job_id, detail)
            .await
        {
            error!(
                job_id = %job.job_id,
                media_asset_id = %job.media_asset_id,
                "Failed to record job failure: {}", e
            );
        }
    }
}
