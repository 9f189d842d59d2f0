//! Custom error types for site-sync.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Remote error: {0}")]
    RemoteApplication(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Stale cursor: {0}")]
    StaleCursor(String),

    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Attach a path to an I/O error.
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
