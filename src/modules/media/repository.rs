use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{ArtifactUrls, MediaAsset, MediaAssetRow, ProcessingStatus};
use crate::infrastructure::db::pool::DbPool;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("media asset {0} not found")]
    NotFound(Uuid),

    #[error("media asset {id} is '{status}' and cannot move to '{target}'")]
    Conflict {
        id: Uuid,
        status: ProcessingStatus,
        target: ProcessingStatus,
    },

    #[error("media asset {0} has a malformed row: {1}")]
    Malformed(Uuid, String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StateError {
    /// Whether the same write could succeed if tried again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StateError::Database(_))
    }
}

/// Sole writer of processing state into a media asset. Every mutation is a
/// single conditional update fenced by the claiming job id.
#[async_trait]
pub trait MediaAssetStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<MediaAsset>, StateError>;

    async fn mark_processing(&self, id: Uuid, job_id: Uuid) -> Result<(), StateError>;

    async fn mark_ready(&self, id: Uuid, job_id: Uuid, urls: &ArtifactUrls)
        -> Result<(), StateError>;

    async fn mark_failed(&self, id: Uuid, job_id: Uuid, detail: &str) -> Result<(), StateError>;

    /// Fail every asset stuck in `processing` for longer than `older_than`.
    async fn fail_stale(&self, older_than: Duration, detail: &str) -> Result<u64, StateError>;
}

const ASSET_COLUMNS: &str = r#"
    id, owner_content_id, kind, original_url, hls_url, thumbnail_url,
    blur_thumbnail_url, processing_status, order_index, error_detail,
    processing_job_id, processing_started_at, processed_at, failed_at
"#;

#[derive(Clone)]
pub struct MediaAssetRepository {
    pool: DbPool,
}

impl MediaAssetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // Called when a conditional update touched no rows
    async fn explain_miss(&self, id: Uuid, target: ProcessingStatus) -> StateError {
        match self.find(id).await {
            Ok(Some(asset)) => StateError::Conflict {
                id,
                status: asset.processing_status,
                target,
            },
            Ok(None) => StateError::NotFound(id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl MediaAssetStore for MediaAssetRepository {
    async fn find(&self, id: Uuid) -> Result<Option<MediaAsset>, StateError> {
        let query = format!("SELECT {} FROM media_assets WHERE id = $1", ASSET_COLUMNS);
        let row = sqlx::query_as::<_, MediaAssetRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| MediaAsset::try_from(r).map_err(|e| StateError::Malformed(id, e)))
            .transpose()
    }

    async fn mark_processing(&self, id: Uuid, job_id: Uuid) -> Result<(), StateError> {
        let result = sqlx::query(
            r#"
            UPDATE media_assets
            SET processing_status = 'processing',
                processing_job_id = $2,
                processing_started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND (processing_status IN ('uploaded', 'pending')
                   OR (processing_status = 'processing' AND processing_job_id = $2))
            "#,
        )
        .bind(id)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_miss(id, ProcessingStatus::Processing).await);
        }
        Ok(())
    }

    async fn mark_ready(
        &self,
        id: Uuid,
        job_id: Uuid,
        urls: &ArtifactUrls,
    ) -> Result<(), StateError> {
        let result = sqlx::query(
            r#"
            UPDATE media_assets
            SET processing_status = 'ready',
                hls_url = $3,
                thumbnail_url = $4,
                blur_thumbnail_url = $5,
                error_detail = NULL,
                processed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND processing_status = 'processing' AND processing_job_id = $2
            "#,
        )
        .bind(id)
        .bind(job_id)
        .bind(&urls.hls_url)
        .bind(&urls.thumbnail_url)
        .bind(&urls.blur_thumbnail_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_miss(id, ProcessingStatus::Ready).await);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, job_id: Uuid, detail: &str) -> Result<(), StateError> {
        let result = sqlx::query(
            r#"
            UPDATE media_assets
            SET processing_status = 'failed',
                error_detail = $3,
                failed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND processing_status = 'processing' AND processing_job_id = $2
            "#,
        )
        .bind(id)
        .bind(job_id)
        .bind(detail)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let err = self.explain_miss(id, ProcessingStatus::Failed).await;
            warn!(media_asset_id = %id, job_id = %job_id, "Failure not recorded: {}", err);
            return Err(err);
        }
        Ok(())
    }

    async fn fail_stale(&self, older_than: Duration, detail: &str) -> Result<u64, StateError> {
        let result = sqlx::query(
            r#"
            UPDATE media_assets
            SET processing_status = 'failed',
                error_detail = $2,
                failed_at = NOW(),
                updated_at = NOW()
            WHERE processing_status = 'processing'
              AND processing_started_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than.as_secs_f64())
        .bind(detail)
        .execute(&self.pool)
        .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            info!("🧹 Failed {} stale processing media assets", swept);
        }
        Ok(swept)
    }
}
