// Error types shared across the bot.

use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration or asset-table problems. Fatal only at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {message}")]
    Invalid { name: String, message: String },
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Failures while composing the annotated map.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("reference map image is unavailable: {0}")]
    AssetMissing(String),
    #[error("failed to encode rendered map: {0}")]
    Encode(#[from] image::ImageError),
}

/// Failures from the image host or the chat messenger.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

impl DeliveryError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DeliveryError::Status { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::NotConfigured(_) | DeliveryError::Rejected(_) => false,
        }
    }
}
