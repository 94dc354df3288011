//! Error types for the deployd agent

use thiserror::Error;

/// Main error type for the deployd agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Archive extraction failed: {0}")]
    ExtractError(String),

    #[error("Sync error: {0}")]
    SyncError(String),

    #[error("Setup script error: {0}")]
    SetupError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Validation error: missing required field '{0}'")]
    MissingField(String),

    #[error("Validation error: field '{0}' is empty")]
    EmptyField(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}
