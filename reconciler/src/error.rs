//! Error types for the reconciler library

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the reconciler library
#[derive(Error, Debug)]
pub enum Error {
    /// No workspace metadata entry points at the requested directory
    #[error("workspace not found for directory: {}", .0.display())]
    WorkspaceNotFound(PathBuf),

    /// The global store could not be opened at all
    #[error("storage unavailable at {}: {reason}", path.display())]
    StorageUnavailable { path: PathBuf, reason: String },

    /// `start` has not been run for this directory
    #[error("checkpoint not found at {}", .0.display())]
    CheckpointNotFound(PathBuf),

    /// A git invocation failed
    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the reconciler library
pub type Result<T> = std::result::Result<T, Error>;
