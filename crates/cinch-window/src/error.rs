//! Error types for configuration and trimming.
//!
//! Nothing here escapes [`Compactor::compact`](crate::context::compactor::Compactor::compact):
//! configuration errors are raised at construction, and trim errors are
//! recovered inside the summarizer.

use thiserror::Error;

/// Invalid or unreadable compaction configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("buffer_ratio must be between 0 and 1, got {0}")]
    BufferRatioOutOfRange(f64),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure while fitting messages into the summarization token budget.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrimError {
    #[error("token counter charges {baseline} tokens for an empty sequence (limit {limit})")]
    BaselineExceedsLimit { baseline: usize, limit: usize },
}
