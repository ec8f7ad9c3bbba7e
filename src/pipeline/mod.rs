//! HLS transcoding pipeline: encode a staged source into a variant ladder,
//! compose the master playlist, extract thumbnails, upload, record status.

pub mod cleanup;
pub mod encoder;
pub mod error;
pub mod ladder;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod thumbnail;
pub mod transcode;
pub mod uploader;

pub use encoder::{FfmpegEncoder, MediaEncoder, SourceInfo};
pub use error::ProcessingError;
pub use ladder::{default_ladder, Variant};
pub use orchestrator::{PipelineConfig, ProcessingOutcome, TranscodePipeline};
pub use progress::ProgressReporter;
