//! LLM client abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::tools::{Tool, ToolObserver};

/// Upper bound on model/tool exchanges in a single tool conversation.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Tool conversation failed: {0}")]
    ToolLoop(String),
}

impl LlmError {
    /// Connection-level faults that the transport may retry on its own.
    pub fn is_transport(&self) -> bool {
        matches!(self, LlmError::Http(_) | LlmError::Timeout(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Http(_) => "http",
            LlmError::Api { .. } => "api",
            LlmError::Json(_) => "json",
            LlmError::Timeout(_) => "timeout",
            LlmError::NotConfigured(_) => "not_configured",
            LlmError::ToolLoop(_) => "tool_loop",
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmUsage {
    pub fn add(&mut self, other: LlmUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Request for a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (instructions for the model)
    pub system: Option<String>,
    /// User message
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 4096,
            temperature: 0.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The generated text
    pub text: String,
    /// Token usage, summed over every round of a tool conversation
    pub usage: LlmUsage,
    /// Model used
    pub model: String,
    /// Number of tool calls the model made
    pub tool_calls: u32,
}

/// Trait for LLM clients.
///
/// Implementations hold their own configuration; nothing is read from
/// process-wide state at call time.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name (e.g., "anthropic", "openai", "ollama")
    fn provider(&self) -> &str;

    /// Model name (e.g., "claude-3-5-haiku-latest")
    fn model(&self) -> &str;

    /// Send a completion request and get a text response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Run a conversation in which the model may call `tool` any number of
    /// times before giving its final text answer.
    ///
    /// `observer` sees every call and every result as they happen.
    async fn complete_with_tool(
        &self,
        request: CompletionRequest,
        tool: &dyn Tool,
        observer: &dyn ToolObserver,
    ) -> Result<CompletionResponse, LlmError>;
}
