#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use transcoder::infrastructure::queue::JobQueue;
use transcoder::infrastructure::storage::{ObjectStore, StorageError};
use transcoder::modules::media::events::{DeadLetter, JobDescriptor, QueuedJob};
use transcoder::modules::media::model::{ArtifactUrls, MediaAsset, MediaKind, ProcessingStatus};
use transcoder::modules::media::repository::{MediaAssetStore, StateError};
use transcoder::pipeline::encoder::PLAYLIST_NAME;
use transcoder::pipeline::error::ProcessingResult;
use transcoder::pipeline::{
    MediaEncoder, PipelineConfig, ProcessingError, ProgressReporter, SourceInfo, TranscodePipeline,
    Variant,
};

pub const CDN: &str = "https://cdn.test/media";

pub fn video_asset(owner_content_id: Uuid) -> MediaAsset {
    MediaAsset {
        id: Uuid::new_v4(),
        owner_content_id,
        kind: MediaKind::Video,
        original_url: "https://cdn.test/raw/upload.mp4".to_string(),
        hls_url: None,
        thumbnail_url: None,
        blur_thumbnail_url: None,
        processing_status: ProcessingStatus::Pending,
        order_index: 0,
        error_detail: None,
        processing_job_id: None,
        processing_started_at: None,
        processed_at: None,
        failed_at: None,
    }
}

/// Write a non-empty fake upload and describe a job for it.
pub async fn stage_job(uploads: &Path, asset: &MediaAsset) -> JobDescriptor {
    let job_id = Uuid::new_v4();
    let source_path = uploads.join(format!("{}.mp4", job_id));
    tokio::fs::create_dir_all(uploads).await.unwrap();
    tokio::fs::write(&source_path, b"\x00\x00\x00\x18ftypmp42 fake upload")
        .await
        .unwrap();

    JobDescriptor {
        job_id,
        media_asset_id: asset.id,
        source_path,
        owner_content_id: asset.owner_content_id,
    }
}

#[derive(Default)]
pub struct MemoryAssetStore {
    assets: Mutex<HashMap<Uuid, MediaAsset>>,
    history: Mutex<Vec<(Uuid, ProcessingStatus)>>,
    /// Every call fails with a pool timeout while set.
    pub unavailable: AtomicBool,
}

impl MemoryAssetStore {
    pub fn with(assets: impl IntoIterator<Item = MediaAsset>) -> Self {
        let store = Self::default();
        {
            let mut map = store.assets.lock().unwrap();
            for asset in assets {
                map.insert(asset.id, asset);
            }
        }
        store
    }

    pub fn get(&self, id: Uuid) -> MediaAsset {
        self.assets.lock().unwrap()[&id].clone()
    }

    pub fn update(&self, id: Uuid, change: impl FnOnce(&mut MediaAsset)) {
        let mut map = self.assets.lock().unwrap();
        if let Some(asset) = map.get_mut(&id) {
            change(asset);
        }
    }

    /// Status transitions of one asset, in write order.
    pub fn history(&self, id: Uuid) -> Vec<ProcessingStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(asset_id, _)| *asset_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn transition(
        &self,
        id: Uuid,
        job_id: Uuid,
        target: ProcessingStatus,
        apply: impl FnOnce(&mut MediaAsset),
    ) -> Result<(), StateError> {
        let mut map = self.assets.lock().unwrap();
        let asset = map.get_mut(&id).ok_or(StateError::NotFound(id))?;

        let status = asset.processing_status;
        let owned = status == ProcessingStatus::Processing && asset.processing_job_id == Some(job_id);
        let allowed = match target {
            // A redelivered job may reclaim its own asset
            ProcessingStatus::Processing => status.can_transition_to(target) || owned,
            _ => owned && status.can_transition_to(target),
        };
        if !allowed {
            return Err(StateError::Conflict {
                id,
                status: asset.processing_status,
                target,
            });
        }

        asset.processing_status = target;
        apply(asset);
        self.history.lock().unwrap().push((id, target));
        Ok(())
    }
}

#[async_trait]
impl MediaAssetStore for MemoryAssetStore {
    async fn find(&self, id: Uuid) -> Result<Option<MediaAsset>, StateError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StateError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.assets.lock().unwrap().get(&id).cloned())
    }

    async fn mark_processing(&self, id: Uuid, job_id: Uuid) -> Result<(), StateError> {
        self.transition(id, job_id, ProcessingStatus::Processing, |asset| {
            asset.processing_job_id = Some(job_id);
            asset.processing_started_at = Some(OffsetDateTime::now_utc());
        })
    }

    async fn mark_ready(
        &self,
        id: Uuid,
        job_id: Uuid,
        urls: &ArtifactUrls,
    ) -> Result<(), StateError> {
        self.transition(id, job_id, ProcessingStatus::Ready, |asset| {
            asset.hls_url = Some(urls.hls_url.clone());
            asset.thumbnail_url = Some(urls.thumbnail_url.clone());
            asset.blur_thumbnail_url = Some(urls.blur_thumbnail_url.clone());
            asset.error_detail = None;
            asset.processed_at = Some(OffsetDateTime::now_utc());
        })
    }

    async fn mark_failed(&self, id: Uuid, job_id: Uuid, detail: &str) -> Result<(), StateError> {
        self.transition(id, job_id, ProcessingStatus::Failed, |asset| {
            asset.error_detail = Some(detail.to_string());
            asset.failed_at = Some(OffsetDateTime::now_utc());
        })
    }

    async fn fail_stale(&self, older_than: Duration, detail: &str) -> Result<u64, StateError> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let mut map = self.assets.lock().unwrap();
        let mut swept = 0;

        for asset in map.values_mut() {
            let stale = asset.processing_status == ProcessingStatus::Processing
                && asset.processing_started_at.is_some_and(|at| at < cutoff);
            if stale {
                asset.processing_status = ProcessingStatus::Failed;
                asset.error_detail = Some(detail.to_string());
                asset.failed_at = Some(OffsetDateTime::now_utc());
                self.history
                    .lock()
                    .unwrap()
                    .push((asset.id, ProcessingStatus::Failed));
                swept += 1;
            }
        }
        Ok(swept)
    }
}

/// Writes small but well-formed HLS output instead of running ffmpeg.
#[derive(Default)]
pub struct FakeEncoder {
    pub calls: Mutex<Vec<String>>,
    /// Variant label whose encode exits non-zero.
    pub fail_variant: Option<String>,
    /// Never finish encoding, so the caller's deadline fires.
    pub stall: bool,
}

impl FakeEncoder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn probe(&self, source: &Path) -> ProcessingResult<SourceInfo> {
        self.record(format!("probe {}", source.display()));
        Ok(SourceInfo {
            width: 1280,
            height: 720,
            duration_seconds: Some(10.0),
        })
    }

    async fn encode_variant(
        &self,
        _source: &Path,
        variant: &Variant,
        variant_dir: &Path,
    ) -> ProcessingResult<()> {
        self.record(format!("encode {}", variant.label));

        if self.stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_variant.as_deref() == Some(variant.label.as_str()) {
            return Err(ProcessingError::encode(
                &variant.label,
                "ffmpeg exited with exit status: 1",
                Some("Error while opening encoder for output stream #0:0".to_string()),
            ));
        }

        let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n");
        for segment in 0..2 {
            let name = format!("segment_{:03}.ts", segment);
            tokio::fs::write(variant_dir.join(&name), [0x47u8; 188]).await?;
            playlist.push_str(&format!("#EXTINF:4.000000,\n{}\n", name));
        }
        playlist.push_str("#EXT-X-ENDLIST\n");
        tokio::fs::write(variant_dir.join(PLAYLIST_NAME), playlist).await?;
        Ok(())
    }

    async fn extract_frame(
        &self,
        _source: &Path,
        at_seconds: f64,
        output: &Path,
    ) -> ProcessingResult<()> {
        self.record(format!("frame {}", at_seconds));
        tokio::fs::write(output, [0xffu8, 0xd8, 0xff, 0xe0]).await?;
        Ok(())
    }

    async fn blur_image(&self, _input: &Path, output: &Path) -> ProcessingResult<()> {
        self.record("blur".to_string());
        tokio::fs::write(output, [0xffu8, 0xd8, 0xff, 0xdb]).await?;
        Ok(())
    }
}

pub struct StoredObject {
    pub content_type: String,
    pub body: Vec<u8>,
}

type KeyPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_when: Option<KeyPredicate>,
}

impl MemoryObjectStore {
    pub fn failing_when(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            objects: Mutex::default(),
            fail_when: Some(Box::new(predicate)),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|o| o.body.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<(), StorageError> {
        if self.fail_when.as_ref().is_some_and(|fail| fail(key)) {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "service unavailable".to_string(),
            });
        }

        let body = tokio::fs::read(path).await.map_err(|e| StorageError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                body,
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", CDN, key)
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    pub requeued: Mutex<Vec<(QueuedJob, Duration)>>,
    pub dead: Mutex<Vec<DeadLetter>>,
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn requeue(&self, job: &QueuedJob, delay: Duration) -> anyhow::Result<()> {
        self.requeued.lock().unwrap().push((job.clone(), delay));
        Ok(())
    }

    async fn dead_letter(&self, letter: &DeadLetter) -> anyhow::Result<()> {
        let copy = DeadLetter {
            job: letter.job.clone(),
            error: letter.error.clone(),
            payload: letter.payload.clone(),
        };
        self.dead.lock().unwrap().push(copy);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    reports: Mutex<Vec<(Uuid, u8)>>,
}

impl RecordingProgress {
    pub fn for_job(&self, job_id: Uuid) -> Vec<u8> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, percent)| *percent)
            .collect()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgress {
    async fn report(&self, job_id: Uuid, percent: u8) -> anyhow::Result<()> {
        self.reports.lock().unwrap().push((job_id, percent));
        Ok(())
    }
}

pub struct Harness {
    pub encoder: Arc<FakeEncoder>,
    pub storage: Arc<MemoryObjectStore>,
    pub assets: Arc<MemoryAssetStore>,
    pub progress: Arc<RecordingProgress>,
    pub pipeline: TranscodePipeline,
    pub staging_root: PathBuf,
    pub uploads: PathBuf,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(encoder: FakeEncoder, storage: MemoryObjectStore, assets: MemoryAssetStore) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let staging_root = dir.path().join("staging");
        let uploads = dir.path().join("uploads");

        let encoder = Arc::new(encoder);
        let storage = Arc::new(storage);
        let assets = Arc::new(assets);
        let progress = Arc::new(RecordingProgress::default());

        let pipeline = TranscodePipeline::new(
            encoder.clone(),
            storage.clone(),
            assets.clone(),
            progress.clone(),
            PipelineConfig {
                variant_concurrency: 2,
                upload_concurrency: 4,
                ..PipelineConfig::new(&staging_root)
            },
        )
        .unwrap();

        Self {
            encoder,
            storage,
            assets,
            progress,
            pipeline,
            staging_root,
            uploads,
            _dir: dir,
        }
    }

    pub fn staging_dir(&self, job: &JobDescriptor) -> PathBuf {
        self.staging_root.join(job.job_id.to_string())
    }
}
