//! CLI error types.

use civicfeed_feeds::FeedError;
use civicfeed_server::{ServerError, StoreError};
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Every configured source failed during an ingestion run.
    #[error("all {0} feed sources failed")]
    AllSourcesFailed(usize),

    /// The run finished but its writes were not saved.
    #[error("failed to save the event store: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
