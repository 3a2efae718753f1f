//! Error types shared across vidlayer crates.

use std::path::PathBuf;

/// Top-level error type for vidlayer operations.
#[derive(Debug, thiserror::Error)]
pub enum VidlayerError {
    #[error("Timeline error: {message}")]
    Timeline { message: String },

    #[error("Compile error: {message}")]
    Compile { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Job error: {message}")]
    Job { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using VidlayerError.
pub type VidlayerResult<T> = Result<T, VidlayerError>;

impl VidlayerError {
    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline {
            message: msg.into(),
        }
    }

    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn job(msg: impl Into<String>) -> Self {
        Self::Job {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
