use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

/// Sink for advisory job progress (0-100). Values are for monitoring only.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, job_id: Uuid, percent: u8) -> anyhow::Result<()>;
}

/// Keeps reported values non-decreasing for one job and swallows sink errors.
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    job_id: Uuid,
    last: Option<u8>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter, job_id: Uuid) -> Self {
        Self {
            reporter,
            job_id,
            last: None,
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }

    pub async fn advance(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);

        debug!(job_id = %self.job_id, percent, "Job progress");
        if let Err(e) = self.reporter.report(self.job_id, percent).await {
            warn!(job_id = %self.job_id, "Failed to report progress: {}", e);
        }
    }
}

/// Progress after `done` of `total` variants have encoded.
pub fn variant_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 70;
    }
    (10 + (60 * done.min(total)) / total) as u8
}
