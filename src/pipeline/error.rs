use thiserror::Error;
use uuid::Uuid;

use crate::infrastructure::storage::StorageError;
use crate::modules::media::repository::StateError;

pub type ProcessingResult<T> = Result<T, ProcessingError>;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("invalid source: {0}")]
    Input(String),

    #[error("encode failed for {label}: {message}")]
    Encode {
        label: String,
        message: String,
        stderr: Option<String>,
    },

    #[error("upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("media asset update failed: {0}")]
    State(#[from] StateError),

    #[error("staging filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// Another run of the same job holds its staging directory.
    #[error("job {0} is already running")]
    AlreadyRunning(Uuid),
}

impl ProcessingError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn encode(label: impl Into<String>, message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Encode {
            label: label.into(),
            message: message.into(),
            stderr,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::Input(_) => "input",
            ProcessingError::Encode { .. } => "encode",
            ProcessingError::Upload(_) => "upload",
            ProcessingError::State(_) => "state",
            ProcessingError::Io(_) => "io",
            ProcessingError::AlreadyRunning(_) => "duplicate",
        }
    }

    /// Text stored in `error_detail`; includes the encoder's stderr tail.
    pub fn detail(&self) -> String {
        match self {
            ProcessingError::Encode {
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => format!("{}\n{}", self, stderr.trim()),
            _ => self.to_string(),
        }
    }
}
