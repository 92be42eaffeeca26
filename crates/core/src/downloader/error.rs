//! Error types for the downloader module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while running a download session.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request carried no link.
    #[error("No link provided")]
    MissingLink,

    /// A requested file path tried to escape its session directory.
    #[error("Invalid filename: {path}")]
    InvalidPath { path: String },

    /// A requested file does not exist.
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// The external tool could not be started.
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the zip archive failed.
    #[error("Failed to build archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    /// The server stopped while the session was running.
    #[error("Server is shutting down")]
    Shutdown,

    /// Nobody is listening to the progress stream anymore.
    #[error("Listener disconnected")]
    Disconnected,

    /// A background filesystem task was cancelled or panicked.
    #[error("Background task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    pub fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is the caller's fault (maps to a 4xx response).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingLink | Self::InvalidPath { .. } | Self::FileNotFound { .. }
        )
    }
}
