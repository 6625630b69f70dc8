use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("encoder failed for profile {profile}: {detail}")]
    Encoding { profile: String, detail: String },

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("archive for job {0} not found or expired")]
    NotFound(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("cleanup of {path} failed: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not allocate a unique job id after {0} attempts")]
    IdExhausted(u32),

    #[error("working directory {0} already exists")]
    WorkDirExists(PathBuf),

    #[error("job queue is full, try again later")]
    QueueFull,

    #[error("upload exceeds the configured size limit")]
    PayloadTooLarge,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JobError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn packaging(err: impl std::fmt::Display) -> Self {
        Self::Packaging(err.to_string())
    }
}
