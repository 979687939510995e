//! Worker error types.

use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job queue is full")]
    QueueFull,

    #[error("Service shutting down")]
    ShuttingDown,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job already finished: {0}")]
    JobAlreadyFinished(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] vdetect_media::MediaError),

    #[error("Job state error: {0}")]
    Model(#[from] vdetect_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_filename(msg: impl Into<String>) -> Self {
        Self::InvalidFilename(msg.into())
    }

    /// Check if the caller should retry later (admission was refused).
    pub fn is_backpressure(&self) -> bool {
        matches!(self, WorkerError::QueueFull | WorkerError::ShuttingDown)
    }
}
