//! Unified error handling for the sync client.

use swizil_engine::RemoteOperationError;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Engine error: {0}")]
    Engine(#[from] swizil_engine::Error),

    #[error(transparent)]
    Remote(#[from] RemoteOperationError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The request needs the remote store and the device is offline.
    #[error("Offline")]
    Offline,

    /// The sync service task is no longer running.
    #[error("Sync service stopped")]
    ServiceStopped,
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
