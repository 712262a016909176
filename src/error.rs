//! Error types for the streaming pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output directory {} is not writable", .0.display())]
    NotWritable(PathBuf),

    #[error("failed to spawn transcoder: {0}")]
    TranscoderSpawn(std::io::Error),

    #[error("transcoder exited immediately: {stderr}")]
    TranscoderExited { stderr: String },

    #[error("token source failed: {0}")]
    TokenSource(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StreamError {
    /// Errors raised by the caller's input rather than by the pipeline.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, StreamError::InvalidRequest(_))
    }
}
