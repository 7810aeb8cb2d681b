//! Error types for the sync engine

use thiserror::Error;

/// Errors that can occur during a sync pass.
///
/// Per-entry and per-job problems are logged and recovered locally; only
/// configuration-class errors (cross-device links, malformed catalogs,
/// unsupported tag formats) propagate and abort the run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tag error: {0}")]
    Tags(#[from] portatune_tags::TagError),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Cannot hardlink across filesystems: {0}")]
    CrossDevice(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
