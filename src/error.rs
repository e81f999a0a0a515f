//! Error types for the transfer engine.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to prepare {}: {source}", path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to merge segments: {0}")]
    Merge(#[source] io::Error),

    /// Every worker exited, but not all of them reached the end of their range.
    #[error("transfer incomplete: {finished} of {planned} segments finished")]
    Incomplete { finished: usize, planned: usize },

    #[error("background transfer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, DownloadError>;
