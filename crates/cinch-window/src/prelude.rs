//! Convenience re-exports for common `cinch-window` types.
//!
//! ```ignore
//! use cinch_window::prelude::*;
//! ```
//!
//! Pulls in what a caller needs to compact a history: message constructors,
//! the [`Compactor`] and its config, the token counter and summary model
//! traits with their stock implementations. Pipeline stage functions
//! (cutoff search, trimming, retention) are left in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, OpenRouterClient, ToolCall};

// ── Compaction ──────────────────────────────────────────────────────
pub use crate::config::CompactionConfig;
pub use crate::context::{
    ApproximateTokenCounter, Compactor, ContextUsage, FnSummaryModel, OpenRouterSummaryModel,
    SummarizerModelConfig, SummaryModel, TokenCounter,
};
pub use crate::error::{ConfigError, TrimError};
