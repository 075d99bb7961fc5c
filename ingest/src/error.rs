//! Ingestion error types

use shared::SharedError;
use thiserror::Error;

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

/// Ingestion error types
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to connect to relay feed {url}: {message}")]
    ConnectFailed { url: String, message: String },

    #[error("Relay feed transport error: {message}")]
    Transport { message: String },

    #[error("Relay returned HTTP {status}: {body}")]
    Relay { status: u16, body: String },

    #[error("Relay requires a captcha token for registration")]
    CaptchaRequired,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Work queue closed, dropped check for {chat}")]
    QueueClosed { chat: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IngestError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
