use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

pub const TRANSCODE_QUEUE: &str = "transcoding_tasks";
pub const DEAD_LETTER_QUEUE: &str = "transcoding_tasks.dead";
/// Holds requeued jobs until their per-message TTL expires, then routes
/// them back to `TRANSCODE_QUEUE`.
pub const RETRY_QUEUE: &str = "transcoding_tasks.retry";

/// One transcoding request, as produced by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub job_id: Uuid,
    pub media_asset_id: Uuid,
    pub source_path: PathBuf,
    pub owner_content_id: Uuid,
}

/// Wire envelope on the queue. `attempt` is bookkeeping for the retry policy
/// and absent on first publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    #[serde(flatten)]
    pub job: JobDescriptor,
    #[serde(default)]
    pub attempt: u32,
}

impl QueuedJob {
    pub fn first(job: JobDescriptor) -> Self {
        Self { job, attempt: 0 }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            job: self.job.clone(),
            attempt: self.attempt + 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job: Option<QueuedJob>,
    pub error: String,
    pub payload: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_payload_without_attempt() {
        let raw = r#"{
            "mediaAssetId": "6f1c3e6a-3c1f-4d2b-9d8e-2f0d5f5b7a11",
            "sourcePath": "/tmp/uploads/raw.mp4",
            "jobId": "0b8e6a4c-7a61-4c7e-bf09-3b2f9c6a2d10",
            "ownerContentId": "d4a0f2c2-1b55-4d7c-9b58-92a4f0f3e9a7"
        }"#;

        let queued: QueuedJob = serde_json::from_str(raw).unwrap();
        assert_eq!(queued.attempt, 0);
        assert_eq!(queued.job.source_path, PathBuf::from("/tmp/uploads/raw.mp4"));

        let retried = queued.next_attempt();
        let json = serde_json::to_value(&retried).unwrap();
        assert_eq!(json["attempt"], 1);
        assert_eq!(json["jobId"], "0b8e6a4c-7a61-4c7e-bf09-3b2f9c6a2d10");
    }
}
