use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// Processing state of a media asset. Transitions only move forward;
/// `Failed` and `Ready` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Uploaded,
    Pending,
    Processing,
    Ready,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Uploaded => "uploaded",
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Ready => "ready",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Ready | ProcessingStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Uploaded, Pending)
                | (Uploaded, Processing)
                | (Pending, Processing)
                | (Processing, Ready)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(ProcessingStatus::Uploaded),
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "ready" => Ok(ProcessingStatus::Ready),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub owner_content_id: Uuid,
    pub kind: MediaKind,
    pub original_url: String,
    pub hls_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub blur_thumbnail_url: Option<String>,
    pub processing_status: ProcessingStatus,
    pub order_index: i32,
    pub error_detail: Option<String>,
    pub processing_job_id: Option<Uuid>,
    pub processing_started_at: Option<OffsetDateTime>,
    pub processed_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
}

// Status and kind are stored as text columns
#[derive(Debug, FromRow)]
pub struct MediaAssetRow {
    pub id: Uuid,
    pub owner_content_id: Uuid,
    pub kind: String,
    pub original_url: String,
    pub hls_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub blur_thumbnail_url: Option<String>,
    pub processing_status: String,
    pub order_index: i32,
    pub error_detail: Option<String>,
    pub processing_job_id: Option<Uuid>,
    pub processing_started_at: Option<OffsetDateTime>,
    pub processed_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
}

impl TryFrom<MediaAssetRow> for MediaAsset {
    type Error = String;

    fn try_from(row: MediaAssetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_content_id: row.owner_content_id,
            kind: row.kind.parse()?,
            original_url: row.original_url,
            hls_url: row.hls_url,
            thumbnail_url: row.thumbnail_url,
            blur_thumbnail_url: row.blur_thumbnail_url,
            processing_status: row.processing_status.parse()?,
            order_index: row.order_index,
            error_detail: row.error_detail,
            processing_job_id: row.processing_job_id,
            processing_started_at: row.processing_started_at,
            processed_at: row.processed_at,
            failed_at: row.failed_at,
        })
    }
}

/// Final artifact URLs, written together with the `ready` transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactUrls {
    pub hls_url: String,
    pub thumbnail_url: String,
    pub blur_thumbnail_url: String,
}
