use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::encoder::{MediaEncoder, SourceInfo};
use super::error::{ProcessingError, ProcessingResult};

pub const POSTER_NAME: &str = "thumb.jpg";
pub const BLURRED_NAME: &str = "blur.jpg";
const POSTER_TIMESTAMP_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnails {
    pub poster: PathBuf,
    pub blurred: PathBuf,
}

/// Poster seek position: one second in, or the middle of shorter clips.
pub fn poster_timestamp(info: &SourceInfo) -> f64 {
    match info.duration_seconds {
        Some(duration) if duration <= POSTER_TIMESTAMP_SECONDS => (duration / 2.0).max(0.0),
        _ => POSTER_TIMESTAMP_SECONDS,
    }
}

/// Extract the poster frame and derive the blurred placeholder from it.
pub async fn extract_thumbnails(
    encoder: &dyn MediaEncoder,
    source: &Path,
    info: &SourceInfo,
    output_dir: &Path,
) -> ProcessingResult<Thumbnails> {
    let poster = output_dir.join(POSTER_NAME);
    let blurred = output_dir.join(BLURRED_NAME);

    encoder
        .extract_frame(source, poster_timestamp(info), &poster)
        .await?;
    ensure_written(&poster, "poster").await?;

    encoder.blur_image(&poster, &blurred).await?;
    ensure_written(&blurred, "blur").await?;

    info!("🖼️ Thumbnails extracted");
    Ok(Thumbnails { poster, blurred })
}

async fn ensure_written(path: &Path, label: &str) -> ProcessingResult<()> {
    match fs::metadata(path).await {
        Ok(m) if m.len() > 0 => Ok(()),
        _ => Err(ProcessingError::encode(
            label,
            format!("encoder produced no image at '{}'", path.display()),
            None,
        )),
    }
}
