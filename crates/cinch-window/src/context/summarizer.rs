//! Summarization of the compacted span.
//!
//! The span is first fitted into `trim_limit` tokens (see
//! [`trim_messages`]), rendered as `[role]: text` lines, and dropped into the
//! prompt template. The model call is the only fallible step that talks to
//! the outside world, and it never fails the compaction: errors come back as
//! summary text so the user can see what happened in the history itself.

use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::config::CompactionConfig;
use crate::context::budget::TokenCounter;
use crate::context::trim::trim_messages;
use crate::{ChatRequest, Message, MessageRole, OpenRouterClient};

/// Summary returned for an empty span. The model is not called.
pub const EMPTY_SPAN_SUMMARY: &str = "No previous conversation history.";

/// Prefix of the summary text produced when the model call fails.
pub const SUMMARY_ERROR_PREFIX: &str = "Error generating summary:";

/// Placeholder in the prompt template replaced by the rendered messages.
pub const MESSAGES_PLACEHOLDER: &str = "{messages}";

/// Boxed future returned by [`SummaryModel::complete`].
pub type SummaryFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// A text-completion backend used to produce summaries.
///
/// Receives the fully rendered prompt and returns the completion text.
/// Errors are plain strings; the summarizer folds them into the summary.
pub trait SummaryModel: Send + Sync {
    fn complete(&self, prompt: &str) -> SummaryFuture<'_>;
}

type BoxedSummary = Pin<Box<dyn Future<Output = Result<String, String>> + Send>>;
type ErasedHandler = Box<dyn Fn(String) -> BoxedSummary + Send + Sync>;

/// A [`SummaryModel`] backed by an async closure.
///
/// ```ignore
/// let model = FnSummaryModel::new(|prompt: String| async move {
///     Ok(format!("summary of {} chars", prompt.len()))
/// });
/// ```
pub struct FnSummaryModel {
    handler: ErasedHandler,
}

impl FnSummaryModel {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let erased = move |prompt: String| -> BoxedSummary { Box::pin(handler(prompt)) };
        Self {
            handler: Box::new(erased),
        }
    }
}

impl SummaryModel for FnSummaryModel {
    fn complete(&self, prompt: &str) -> SummaryFuture<'_> {
        (self.handler)(prompt.to_string())
    }
}

impl std::fmt::Debug for FnSummaryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSummaryModel").finish_non_exhaustive()
    }
}

/// Model settings for [`OpenRouterSummaryModel`].
#[derive(Debug, Clone)]
pub struct SummarizerModelConfig {
    /// Model to use for summarization. Usually cheaper than the main model.
    pub model: String,
    /// Maximum tokens for the summarization response.
    pub max_summary_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for SummarizerModelConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            max_summary_tokens: 2048,
            temperature: 0.2,
        }
    }
}

impl SummarizerModelConfig {
    /// Use a specific model id.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// [`SummaryModel`] that sends the prompt as a single user message to
/// OpenRouter.
pub struct OpenRouterSummaryModel {
    client: OpenRouterClient,
    config: SummarizerModelConfig,
}

impl OpenRouterSummaryModel {
    pub fn new(client: OpenRouterClient, config: SummarizerModelConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, prompt: String) -> ChatRequest {
        ChatRequest {
            model: Some(self.config.model.clone()),
            messages: vec![Message::user(prompt)],
            max_tokens: self.config.max_summary_tokens,
            temperature: self.config.temperature,
        }
    }
}

impl SummaryModel for OpenRouterSummaryModel {
    fn complete(&self, prompt: &str) -> SummaryFuture<'_> {
        let request = self.request(prompt.to_string());
        Box::pin(async move {
            let completion = self.client.chat(&request).await?;
            completion
                .content
                .ok_or_else(|| "empty summary response".to_string())
        })
    }
}

/// Produces the summary text for a span of messages.
#[derive(Debug, Clone)]
pub struct Summarizer {
    prompt_template: String,
    trim_limit: usize,
    fallback_count: usize,
}

impl Summarizer {
    pub fn new(config: &CompactionConfig) -> Self {
        Self {
            prompt_template: config.summary_prompt.clone(),
            trim_limit: config.trim_limit,
            fallback_count: config.fallback_count,
        }
    }

    /// Summarize `span`. Never fails: an empty span yields
    /// [`EMPTY_SPAN_SUMMARY`], a model error yields text starting with
    /// [`SUMMARY_ERROR_PREFIX`].
    pub async fn summarize(
        &self,
        span: &[Message],
        counter: &dyn TokenCounter,
        model: &dyn SummaryModel,
    ) -> String {
        if span.is_empty() {
            return EMPTY_SPAN_SUMMARY.to_string();
        }

        let input = self.messages_for_summary(span, counter);
        let prompt = self.build_prompt(&input);
        debug!(
            "Summarizing {} of {} messages ({} prompt bytes)",
            input.len(),
            span.len(),
            prompt.len()
        );

        match model.complete(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("Summarization failed: {e}. Using an error summary instead.");
                format!("{SUMMARY_ERROR_PREFIX} {e}")
            }
        }
    }

    /// Fit `span` into the trim budget. Never returns an empty list for a
    /// non-empty span: an empty trim keeps the last message, and a trim
    /// error keeps the last `fallback_count` messages.
    pub fn messages_for_summary(
        &self,
        span: &[Message],
        counter: &dyn TokenCounter,
    ) -> Vec<Message> {
        match trim_messages(span, self.trim_limit, counter) {
            Ok(trimmed) if trimmed.is_empty() && !span.is_empty() => {
                debug!("Trim kept nothing; summarizing the last message only");
                span[span.len() - 1..].to_vec()
            }
            Ok(trimmed) => trimmed,
            Err(e) => {
                warn!(
                    "Trimming for summary failed: {e}. Falling back to the last {} messages.",
                    self.fallback_count
                );
                let start = span.len().saturating_sub(self.fallback_count);
                span[start..].to_vec()
            }
        }
    }

    /// Render `messages` into the prompt template.
    pub fn build_prompt(&self, messages: &[Message]) -> String {
        let rendered = render_messages(messages);
        if self.prompt_template.contains(MESSAGES_PLACEHOLDER) {
            self.prompt_template.replace(MESSAGES_PLACEHOLDER, &rendered)
        } else {
            format!("{}\n\n{rendered}", self.prompt_template)
        }
    }
}

/// Render messages as `[role]: text` blocks, with tool calls listed under
/// the assistant turn that made them.
pub fn render_messages(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let role = &msg.role;
        match role {
            MessageRole::Tool => {
                let call = msg.tool_call_id.as_deref().unwrap_or("?");
                let text = msg.content.as_deref().unwrap_or("[no content]");
                let _ = writeln!(out, "[{role} {call}]: {text}\n");
            }
            MessageRole::Assistant if msg.has_tool_calls() => {
                let _ = writeln!(out, "[{role}]: {}", msg.content.as_deref().unwrap_or(""));
                for call in msg.tool_calls.iter().flatten() {
                    let _ = writeln!(
                        out,
                        "  -> {}({}) [{}]",
                        call.function.name, call.function.arguments, call.id
                    );
                }
                out.push('\n');
            }
            MessageRole::System | MessageRole::User | MessageRole::Assistant => {
                let text = msg.content.as_deref().unwrap_or("[no content]");
                let _ = writeln!(out, "[{role}]: {text}\n");
            }
        }
    }
    out.trim_end().to_string()
}
