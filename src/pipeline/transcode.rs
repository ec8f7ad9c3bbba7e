use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::encoder::{MediaEncoder, PLAYLIST_NAME};
use super::error::{ProcessingError, ProcessingResult};
use super::ladder::Variant;

/// Rejects a missing, non-regular or empty source before any encoder runs.
pub async fn validate_source(source: &Path) -> ProcessingResult<u64> {
    let metadata = match fs::metadata(source).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ProcessingError::input(format!(
                "source file '{}' does not exist",
                source.display()
            )));
        }
        Err(e) => {
            return Err(ProcessingError::input(format!(
                "source file '{}' is unreadable: {}",
                source.display(),
                e
            )));
        }
    };

    if !metadata.is_file() {
        return Err(ProcessingError::input(format!(
            "source '{}' is not a regular file",
            source.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(ProcessingError::input(format!(
            "source file '{}' is empty",
            source.display()
        )));
    }

    Ok(metadata.len())
}

/// Index-named directory a variant is encoded into before it is renamed to its label.
pub fn staged_variant_dir(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(index.to_string())
}

/// Encode one variant into its index-named directory and check it produced a playlist.
pub async fn transcode_variant(
    encoder: &dyn MediaEncoder,
    source: &Path,
    index: usize,
    variant: &Variant,
    output_dir: &Path,
) -> ProcessingResult<PathBuf> {
    let variant_dir = staged_variant_dir(output_dir, index);
    fs::create_dir_all(&variant_dir).await?;

    info!(variant = %variant.label, resolution = %variant.resolution(), "🎞️ Encoding variant");
    encoder.encode_variant(source, variant, &variant_dir).await?;

    let playlist = variant_dir.join(PLAYLIST_NAME);
    match fs::metadata(&playlist).await {
        Ok(m) if m.len() > 0 => Ok(variant_dir),
        _ => Err(ProcessingError::encode(
            &variant.label,
            "encoder produced no playlist",
            None,
        )),
    }
}
