use futures_util::{stream, StreamExt, TryStreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::error::{ProcessingError, ProcessingResult};
use crate::infrastructure::storage::ObjectStore;

/// Manifest and segment files; thumbnails are uploaded on their own.
pub const HLS_EXTENSIONS: &[&str] = &["m3u8", "ts"];

pub const HLS_PLAYLIST_MIME: &str = "application/vnd.apple.mpegurl";
pub const TRANSPORT_STREAM_MIME: &str = "video/mp2t";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    /// Path relative to the walked root, `/`-separated.
    pub relative: String,
}

pub fn content_type_for(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("m3u8") => HLS_PLAYLIST_MIME.to_string(),
        Some("ts") => TRANSPORT_STREAM_MIME.to_string(),
        _ => mime_guess::from_path(path).first_or_octet_stream().to_string(),
    }
}

pub fn object_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(e)))
}

/// Every regular file under `root` whose extension is in `extensions`,
/// ordered by relative path.
pub async fn collect_files(root: &Path, extensions: &[&str]) -> io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, relative_dir)) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if relative_dir.is_empty() {
                name
            } else {
                format!("{}/{}", relative_dir, name)
            };

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push((entry.path(), relative));
            } else if file_type.is_file() && has_extension(&entry.path(), extensions) {
                files.push(LocalFile {
                    path: entry.path(),
                    relative,
                });
            }
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Upload the filtered tree under `prefix`, at most `concurrency` at a time.
/// Stops at the first failed write and returns the public URL of every object.
pub async fn upload_tree(
    store: &dyn ObjectStore,
    local_dir: &Path,
    prefix: &str,
    extensions: &[&str],
    concurrency: usize,
) -> ProcessingResult<Vec<String>> {
    let files = collect_files(local_dir, extensions).await?;
    let total = files.len();

    let urls = stream::iter(files)
        .map(|file| async move {
            let key = object_key(prefix, &file.relative);
            let content_type = content_type_for(&file.path);
            store.put_file(&key, &file.path, &content_type).await?;
            Ok::<_, ProcessingError>(store.public_url(&key))
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<_>>()
        .await?;

    info!(objects = total, prefix = %prefix, "⬆️ Uploaded output tree");
    Ok(urls)
}
