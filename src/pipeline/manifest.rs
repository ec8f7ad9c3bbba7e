//! Master playlist composition.
//!
//! The master is written by hand rather than taken from the encoder, so its
//! content depends only on the ladder and never on encoder output order.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::encoder::PLAYLIST_NAME;
use super::error::ProcessingResult;
use super::ladder::Variant;
use super::transcode::staged_variant_dir;

pub const MASTER_PLAYLIST_NAME: &str = PLAYLIST_NAME;

/// Relative URL of a variant playlist as referenced from the master.
pub fn variant_playlist_path(variant: &Variant) -> String {
    format!("{}/{}", variant.label, PLAYLIST_NAME)
}

pub fn render_master_playlist(variants: &[Variant]) -> String {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");

    for variant in variants {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}\n",
            variant.bandwidth(),
            variant.resolution(),
            variant_playlist_path(variant)
        ));
    }

    playlist
}

/// Commit the index-named variant directories under their labels, then write
/// the master playlist at the root of `output_dir`. Must only run once every
/// variant has encoded successfully.
pub async fn compose_master_manifest(
    output_dir: &Path,
    variants: &[Variant],
) -> ProcessingResult<PathBuf> {
    for (index, variant) in variants.iter().enumerate() {
        let staged = staged_variant_dir(output_dir, index);
        let target = output_dir.join(&variant.label);

        if fs::try_exists(&target).await? {
            fs::remove_dir_all(&target).await?;
        }
        fs::rename(&staged, &target).await?;
    }

    let master_path = output_dir.join(MASTER_PLAYLIST_NAME);
    fs::write(&master_path, render_master_playlist(variants)).await?;

    info!(variants = variants.len(), path = %master_path.display(), "📝 Master playlist written");
    Ok(master_path)
}
