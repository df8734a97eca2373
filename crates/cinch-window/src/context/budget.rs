//! Token counting and the compaction budget check.
//!
//! The compactor never tokenizes anything itself; it asks a [`TokenCounter`]
//! for the cost of a message sequence. [`ApproximateTokenCounter`] is the
//! default: a character-ratio estimate plus a fixed per-message overhead,
//! which is cheap, deterministic, and monotonic in sequence length (the
//! retention shrink-scan relies on that last property).

use crate::Message;

/// Default characters per token. Most tokenizers average 3-4 chars per
/// token for English text; 4.0 keeps estimates slightly optimistic.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Default per-message overhead (role markers, separators).
pub const DEFAULT_TOKENS_PER_MESSAGE: usize = 3;

/// Maps a message sequence to an approximate token count.
///
/// Implementations must be monotonic: appending a message never lowers the
/// count. Closures of type `Fn(&[Message]) -> usize` implement this trait.
pub trait TokenCounter: Send + Sync {
    fn count(&self, messages: &[Message]) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&[Message]) -> usize + Send + Sync,
{
    fn count(&self, messages: &[Message]) -> usize {
        self(messages)
    }
}

/// Character-ratio token estimate.
///
/// Each message costs `ceil(chars / chars_per_token) + tokens_per_message`,
/// where `chars` covers the role name, the text content, serialized tool
/// calls, and the tool-call id of tool results.
#[derive(Debug, Clone)]
pub struct ApproximateTokenCounter {
    chars_per_token: f64,
    tokens_per_message: usize,
}

impl Default for ApproximateTokenCounter {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            tokens_per_message: DEFAULT_TOKENS_PER_MESSAGE,
        }
    }
}

impl ApproximateTokenCounter {
    /// Create a counter with a calibrated chars-per-token ratio. Pass `None`
    /// to use the default.
    pub fn with_calibration(calibrated_cpt: Option<f64>) -> Self {
        Self {
            chars_per_token: calibrated_cpt.unwrap_or(DEFAULT_CHARS_PER_TOKEN),
            ..Self::default()
        }
    }

    /// Override the per-message overhead.
    pub fn with_tokens_per_message(mut self, tokens: usize) -> Self {
        self.tokens_per_message = tokens;
        self
    }

    fn message_chars(msg: &Message) -> usize {
        let mut chars = msg.role.to_string().len();
        if let Some(ref content) = msg.content {
            chars += content.chars().count();
        }
        if msg.has_tool_calls()
            && let Some(ref calls) = msg.tool_calls
        {
            chars += serde_json::to_string(calls).map_or(0, |s| s.chars().count());
        }
        if let Some(call_id) = msg.answers_call() {
            chars += call_id.chars().count();
        }
        chars
    }
}

impl TokenCounter for ApproximateTokenCounter {
    fn count(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| {
                let chars = Self::message_chars(m) as f64;
                (chars / self.chars_per_token).ceil() as usize + self.tokens_per_message
            })
            .sum()
    }
}

/// Snapshot of a history's size relative to the trigger threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextUsage {
    /// Estimated tokens consumed.
    pub estimated_tokens: usize,
    /// Trigger threshold, if compaction is enabled.
    pub threshold: Option<usize>,
    /// Usage as a fraction of the threshold (0.0 when disabled).
    pub usage_pct: f64,
}

impl ContextUsage {
    /// Measure `messages` against `threshold`.
    pub fn measure(
        messages: &[Message],
        threshold: Option<usize>,
        counter: &dyn TokenCounter,
    ) -> Self {
        let estimated_tokens = counter.count(messages);
        let usage_pct = match threshold {
            Some(0) => 1.0,
            Some(t) => estimated_tokens as f64 / t as f64,
            None => 0.0,
        };
        Self {
            estimated_tokens,
            threshold,
            usage_pct,
        }
    }

    /// Whether this usage calls for compaction: the threshold is set and
    /// the estimate has reached it.
    pub fn needs_compaction(&self) -> bool {
        self.threshold
            .is_some_and(|threshold| self.estimated_tokens >= threshold)
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        match self.threshold {
            Some(t) => format!(
                "context: ~{} tokens ({:.0}% of {})",
                self.estimated_tokens,
                self.usage_pct * 100.0,
                t,
            ),
            None => format!(
                "context: ~{} tokens (compaction disabled)",
                self.estimated_tokens
            ),
        }
    }
}
