//! Context window compaction: token budgets, cutoffs, trimming, summaries.
//!
//! The context window is the scarcest resource in any LLM agent. When a
//! history outgrows its budget, the [`compactor`] replaces the old part with
//! a model-written summary and keeps the recent part verbatim. The stages are
//! separate modules so each can be used and tested on its own:
//!
//! 1. **[`budget`]**: [`TokenCounter`] and the threshold check.
//! 2. **[`cutoff`]**: picks a split point that never separates a tool call
//!    from its results.
//! 3. **[`trim`]**: fits the span to summarize into the summary model's
//!    input budget.
//! 4. **[`summarizer`]**: prompt rendering and the model call, with
//!    graceful degradation on failure.
//! 5. **[`retention`]**: shrinks the preserved tail to fit next to the
//!    summary with headroom for the next turn.
//!
//! [`ids`] fills in missing message ids so the replacement history can be
//! tracked message by message.

pub mod budget;
pub mod compactor;
pub mod cutoff;
pub mod ids;
pub mod retention;
pub mod summarizer;
pub mod trim;

// Re-export commonly used items at the module level.
pub use budget::{ApproximateTokenCounter, ContextUsage, DEFAULT_CHARS_PER_TOKEN, TokenCounter};
pub use compactor::Compactor;
pub use summarizer::{FnSummaryModel, OpenRouterSummaryModel, SummarizerModelConfig, SummaryModel};
