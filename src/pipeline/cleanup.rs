use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::modules::media::events::JobDescriptor;

/// Staging directory owned by one job. Keyed by job id so concurrent jobs
/// never share a directory.
pub fn staging_dir(staging_root: &Path, job_id: Uuid) -> PathBuf {
    staging_root.join(job_id.to_string())
}

/// Remove the job's staging directory and its staged source file.
/// Idempotent; failures are logged and never returned.
pub async fn cleanup(staging_root: &Path, job: &JobDescriptor) {
    remove_staging_dir(staging_root, job.job_id).await;

    match fs::remove_file(&job.source_path).await {
        Ok(()) => debug!(job_id = %job.job_id, "Removed staged source"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            job_id = %job.job_id,
            path = %job.source_path.display(),
            "Failed to remove staged source: {}", e
        ),
    }
}

/// Remove only the staging directory, leaving the source in place.
pub async fn remove_staging_dir(staging_root: &Path, job_id: Uuid) {
    let dir = staging_dir(staging_root, job_id);
    match fs::remove_dir_all(&dir).await {
        Ok(()) => debug!(job_id = %job_id, "Removed staging directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            job_id = %job_id,
            path = %dir.display(),
            "Failed to remove staging directory: {}", e
        ),
    }
}
