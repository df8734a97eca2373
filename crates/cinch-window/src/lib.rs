//! Conversation-window compaction for tool-using LLM agents.
//!
//! `cinch-window` keeps a growing message history inside a model's context
//! budget. When the history crosses a token threshold, the oldest part is
//! condensed into a single summary message by a (cheap) model call and the
//! most recent messages are kept verbatim, shrunk further if the summary plus
//! the kept tail would still overflow the budget.
//!
//! The central type is the [`Compactor`](context::compactor::Compactor). It
//! never mutates the caller's history: it returns `None` when nothing needs
//! to change, or a complete replacement list that the caller installs in place
//! of the old one.
//!
//! # Getting started
//!
//! ```ignore
//! use cinch_window::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let client = OpenRouterClient::new(api_key)?;
//!
//!     let config = CompactionConfig::default()
//!         .with_trigger_threshold(30_000)
//!         .with_keep_count(15);
//!
//!     let compactor = Compactor::new(
//!         config,
//!         ApproximateTokenCounter::default(),
//!         OpenRouterSummaryModel::new(client, SummarizerModelConfig::default()),
//!     )
//!     .map_err(|e| e.to_string())?;
//!
//!     let mut history = load_history();
//!     if let Some(replacement) = compactor.compact(&history).await {
//!         history = replacement;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run compaction:** [`Compactor`](context::compactor::Compactor) and
//!   [`CompactionConfig`](config::CompactionConfig).
//! - **Count tokens:** the [`TokenCounter`](context::budget::TokenCounter)
//!   trait and the [`ApproximateTokenCounter`](context::budget::ApproximateTokenCounter)
//!   default. Any `Fn(&[Message]) -> usize` is a counter too.
//! - **Plug in a summary model:** the
//!   [`SummaryModel`](context::summarizer::SummaryModel) trait,
//!   [`FnSummaryModel`](context::summarizer::FnSummaryModel) for closures, and
//!   [`OpenRouterSummaryModel`](context::summarizer::OpenRouterSummaryModel).
//! - **Individual pipeline stages:** [`context::cutoff`], [`context::trim`],
//!   and [`context::retention`] are plain functions and can be used on their
//!   own.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Token counting, cutoff search, trimming, summarization, retention, and the compactor |
//! | [`config`] | [`CompactionConfig`](config::CompactionConfig) with validation and JSON loading |
//! | [`error`] | Configuration and trimming error types |

pub mod config;
pub mod context;
pub mod error;
pub mod prelude;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for summarization calls.
pub const DEFAULT_MODEL: &str = "z-ai/glm-5";

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Only the fields the summarization call
/// needs; unset fields are omitted from serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
///
/// `User` is the human-authored side of the conversation. `System` is only
/// relevant to trimming, which pins a leading system message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// `tool_calls` is only meaningful on assistant messages and `tool_call_id`
/// only on tool results. `id` may be absent on input; the compactor fills it
/// in (see [`context::ids::assign_missing_ids`]) so downstream reducers can
/// track message identity across a history replacement.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            id: None,
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Attach an explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether this is an assistant message carrying at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        match self.role {
            MessageRole::Assistant => self.tool_calls.as_ref().is_some_and(|c| !c.is_empty()),
            MessageRole::System | MessageRole::User | MessageRole::Tool => false,
        }
    }

    /// Ids of the tool calls issued by this message. Empty for anything
    /// other than an assistant message with tool calls.
    pub fn tool_call_ids(&self) -> Vec<&str> {
        if !self.has_tool_calls() {
            return Vec::new();
        }
        self.tool_calls
            .iter()
            .flatten()
            .map(|c| c.id.as_str())
            .collect()
    }

    /// If this is a tool result, the call id it answers.
    pub fn answers_call(&self) -> Option<&str> {
        match self.role {
            MessageRole::Tool => self.tool_call_id.as_deref(),
            MessageRole::System | MessageRole::User | MessageRole::Assistant => None,
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call emitted by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    /// Create a function tool call.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from `OpenRouterClient::chat()`.
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/cinch-rs", "cinch-window")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("openrouter-client/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}",
            body.model.as_deref().unwrap_or("(none)"),
            body.messages.len(),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        parse_chat_response(&text)
    }
}

/// Decode a raw chat completion body. Split out of [`OpenRouterClient::chat`]
/// so the decoding rules can be tested without a network round-trip.
fn parse_chat_response(text: &str) -> Result<ChatCompletion, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("OpenRouter API error: {}", err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    match parsed.choices.and_then(|c| c.into_iter().next()) {
        Some(c) => Ok(ChatCompletion {
            content: c.message.content,
            usage: parsed.usage,
            finish_reason: c.finish_reason,
        }),
        None => Ok(ChatCompletion {
            content: None,
            usage: parsed.usage,
            finish_reason: None,
        }),
    }
}
