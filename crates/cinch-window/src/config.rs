//! Compaction configuration.
//!
//! Every tunable of the compaction pipeline lives on [`CompactionConfig`];
//! there are no process-wide constants beyond the defaults below. Build one
//! with the `with_*` methods or load it from a JSON file:
//!
//! ```ignore
//! let config = CompactionConfig::default()
//!     .with_trigger_threshold(30_000)
//!     .with_keep_count(15)
//!     .with_buffer_ratio(0.25);
//!
//! // or, from `{"trigger_threshold": 30000, "keep_count": 15}`
//! let config = CompactionConfig::load(".agents/compaction.json")?;
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Default number of trailing messages to preserve.
pub const DEFAULT_KEEP_COUNT: usize = 20;

/// Default token budget for the text fed to the summary model.
pub const DEFAULT_TRIM_LIMIT: usize = 60_000;

/// Default fraction of the free budget reserved for the next turn.
pub const DEFAULT_BUFFER_RATIO: f64 = 0.3;

/// Floor of the reserved buffer, in tokens.
pub const DEFAULT_MIN_BUFFER: usize = 4_000;

/// Neighbourhood inspected around each candidate cutoff for tool-call pairs.
pub const DEFAULT_SEARCH_WINDOW: usize = 5;

/// Messages fed to the summary model when trimming fails.
pub const DEFAULT_FALLBACK_COUNT: usize = 15;

/// Header of the synthetic summary message.
pub const DEFAULT_SUMMARY_PREFIX: &str = "Here is a summary of the conversation to date:";

/// Prompt template for the summary model. `{messages}` is replaced by the
/// rendered (trimmed) history.
pub const DEFAULT_SUMMARY_PROMPT: &str = "\
<primary_objective>
Your sole objective in this task is to extract the highest quality, most relevant context from the conversation history below.
</primary_objective>

<objective_information>
You are nearing the total number of input tokens you can accept, so you must extract the most relevant pieces of information from your conversation history.
This context will then overwrite the conversation history presented below. Only keep what matters for the overall goal.
</objective_information>

<instructions>
The conversation history below will be replaced with the context you extract in this step.
Record the decisions made, the work already completed, and the open threads, so that no completed action is repeated.
Respond ONLY with the extracted context. Do not include any additional text before or after it.
</instructions>

<messages>
Messages to summarize:
{messages}
</messages>";

/// Configuration for the compaction pipeline.
///
/// `trigger_threshold: None` disables compaction entirely. `buffer_ratio`
/// must lie in `[0, 1]`; use [`validate`](Self::validate) (called by
/// [`Compactor::new`](crate::context::compactor::Compactor::new) and
/// [`load`](Self::load)) to check it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Token count at which compaction triggers. `None` disables it.
    pub trigger_threshold: Option<usize>,
    /// Minimum number of trailing messages to preserve verbatim.
    pub keep_count: usize,
    /// Token budget for the summarization input.
    pub trim_limit: usize,
    /// Fraction of the post-summary budget reserved for the next turn.
    pub buffer_ratio: f64,
    /// Lower bound of the reserved buffer.
    pub min_buffer: usize,
    /// Positions inspected on each side of a candidate cutoff.
    pub search_window: usize,
    /// Raw messages summarized when trimming fails.
    pub fallback_count: usize,
    /// Header line of the summary message.
    pub summary_prefix: String,
    /// Prompt template; must contain `{messages}`.
    pub summary_prompt: String,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: None,
            keep_count: DEFAULT_KEEP_COUNT,
            trim_limit: DEFAULT_TRIM_LIMIT,
            buffer_ratio: DEFAULT_BUFFER_RATIO,
            min_buffer: DEFAULT_MIN_BUFFER,
            search_window: DEFAULT_SEARCH_WINDOW,
            fallback_count: DEFAULT_FALLBACK_COUNT,
            summary_prefix: DEFAULT_SUMMARY_PREFIX.to_string(),
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
        }
    }
}

impl CompactionConfig {
    /// Enable compaction at the given token count.
    pub fn with_trigger_threshold(mut self, tokens: usize) -> Self {
        self.trigger_threshold = Some(tokens);
        self
    }

    /// Set the number of trailing messages to preserve.
    pub fn with_keep_count(mut self, n: usize) -> Self {
        self.keep_count = n;
        self
    }

    /// Set the token budget for the summarization input.
    pub fn with_trim_limit(mut self, tokens: usize) -> Self {
        self.trim_limit = tokens;
        self
    }

    /// Set the buffer ratio. Validated by [`validate`](Self::validate).
    pub fn with_buffer_ratio(mut self, ratio: f64) -> Self {
        self.buffer_ratio = ratio;
        self
    }

    /// Set the buffer floor.
    pub fn with_min_buffer(mut self, tokens: usize) -> Self {
        self.min_buffer = tokens;
        self
    }

    /// Set the cutoff search neighbourhood.
    pub fn with_search_window(mut self, positions: usize) -> Self {
        self.search_window = positions;
        self
    }

    /// Set the trim-failure fallback size.
    pub fn with_fallback_count(mut self, n: usize) -> Self {
        self.fallback_count = n;
        self
    }

    /// Set the summary message header.
    pub fn with_summary_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.summary_prefix = prefix.into();
        self
    }

    /// Set the summary prompt template.
    pub fn with_summary_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.summary_prompt = prompt.into();
        self
    }

    /// Check the invariants that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // NaN fails the range check too.
        if !(0.0..=1.0).contains(&self.buffer_ratio) {
            return Err(ConfigError::BufferRatioOutOfRange(self.buffer_ratio));
        }
        Ok(())
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}
