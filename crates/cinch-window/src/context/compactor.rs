//! The compaction pipeline.
//!
//! [`Compactor::compact`] runs once per turn, before the model call:
//!
//! 1. fill in missing message ids,
//! 2. stop unless the history has reached the trigger threshold,
//! 3. find a cutoff that keeps tool calls with their results,
//! 4. summarize everything before the cutoff,
//! 5. shrink the preserved tail until it fits next to the summary,
//! 6. return `[summary message] ++ preserved tail`.
//!
//! The caller replaces its whole history with the returned list. `None`
//! means the history stays as it is. The compactor holds no per-conversation
//! state, so one instance can serve any number of threads.

use tracing::{debug, info};

use crate::Message;
use crate::config::CompactionConfig;
use crate::context::budget::{ContextUsage, TokenCounter};
use crate::context::cutoff::find_safe_cutoff;
use crate::context::ids::{assign_missing_ids, generate_message_id};
use crate::context::retention::{adjust_preserved, preserved_budget};
use crate::context::summarizer::{Summarizer, SummaryModel};
use crate::error::ConfigError;

/// Keeps a conversation inside its token budget by summarizing old turns.
///
/// # Example
///
/// ```ignore
/// let compactor = Compactor::new(
///     CompactionConfig::default().with_trigger_threshold(30_000),
///     ApproximateTokenCounter::default(),
///     model,
/// )?;
///
/// if let Some(replacement) = compactor.compact(&history).await {
///     history = replacement;
/// }
/// ```
#[derive(Debug)]
pub struct Compactor<C, M> {
    config: CompactionConfig,
    summarizer: Summarizer,
    counter: C,
    model: M,
}

impl<C: TokenCounter, M: SummaryModel> Compactor<C, M> {
    /// Build a compactor. Fails if the config is invalid.
    pub fn new(config: CompactionConfig, counter: C, model: M) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            summarizer: Summarizer::new(&config),
            config,
            counter,
            model,
        })
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Measure `messages` against the trigger threshold.
    pub fn usage(&self, messages: &[Message]) -> ContextUsage {
        ContextUsage::measure(messages, self.config.trigger_threshold, &self.counter)
    }

    /// Where the history would be cut if compaction ran now. 0 means it
    /// would not be cut.
    pub fn planned_cutoff(&self, messages: &[Message]) -> usize {
        find_safe_cutoff(messages, self.config.keep_count, self.config.search_window)
    }

    /// Compact `messages` if they have reached the trigger threshold.
    ///
    /// Returns `None` when compaction is disabled, the history is below the
    /// threshold, or no safe cutoff exists. Otherwise returns the complete
    /// replacement history: one summary message followed by the preserved
    /// tail. Summarization failures are folded into the summary text, so
    /// this never fails.
    ///
    /// Missing ids are filled in on a private copy, so only the returned
    /// replacement carries them. Callers that track messages by id on every
    /// turn should run [`assign_missing_ids`] on their history themselves.
    pub async fn compact(&self, messages: &[Message]) -> Option<Vec<Message>> {
        let threshold = self.config.trigger_threshold?;
        let messages = assign_missing_ids(messages);

        let usage = self.usage(&messages);
        if !usage.needs_compaction() {
            debug!("No compaction needed ({})", usage.to_log_string());
            return None;
        }

        let cutoff = self.planned_cutoff(&messages);
        if cutoff == 0 {
            debug!(
                "Over threshold but no safe cutoff in {} messages (keep {})",
                messages.len(),
                self.config.keep_count
            );
            return None;
        }
        info!(
            "Compacting: {}; summarizing {} of {} messages",
            usage.to_log_string(),
            cutoff,
            messages.len()
        );

        let (to_summarize, preserved) = messages.split_at(cutoff);
        let summary = self
            .summarizer
            .summarize(to_summarize, &self.counter, &self.model)
            .await;

        let summary_message = self.summary_message(&summary);
        let summary_tokens = self.counter.count(std::slice::from_ref(&summary_message));
        let budget = preserved_budget(
            threshold,
            summary_tokens,
            self.config.buffer_ratio,
            self.config.min_buffer,
        );
        let kept = match budget {
            Some(budget) => adjust_preserved(preserved, budget, &self.counter),
            None => {
                debug!("Summary alone ({summary_tokens} tokens) fills the budget");
                Vec::new()
            }
        };

        let mut replacement = Vec::with_capacity(kept.len() + 1);
        replacement.push(summary_message);
        replacement.extend(kept);

        info!(
            "Compaction done: {} -> {} messages, ~{} -> ~{} tokens",
            messages.len(),
            replacement.len(),
            usage.estimated_tokens,
            self.counter.count(&replacement)
        );
        Some(replacement)
    }

    /// The synthetic user message carrying the summary.
    fn summary_message(&self, summary: &str) -> Message {
        Message::user(format!("{}\n\n{summary}", self.config.summary_prefix))
            .with_id(generate_message_id())
    }
}
