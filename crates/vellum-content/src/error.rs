use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the content tier.
#[derive(Error, Debug)]
pub enum ContentError {
    /// The cloud container root is not reachable.  Recoverable: callers
    /// fall back to the local cache root.
    #[error("Cloud container unavailable")]
    ContainerUnavailable,

    /// No file exists for the requested path under any root.
    #[error("Content not found: {0}")]
    NotFound(PathBuf),

    /// A cloud placeholder did not finish downloading within the bound.
    /// Retryable, not fatal.
    #[error("Download timed out for {0}")]
    DownloadTimeout(PathBuf),

    /// Generic I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ContentError>;
