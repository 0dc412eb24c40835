//! Model clients.
//!
//! One trait, [`LlmClient`], with provider backends for Anthropic, Ollama and
//! OpenAI-compatible endpoints. Which backend runs is decided by
//! [`LlmConfig`] through [`create_llm_client`].

mod anthropic;
mod client;
mod config;
mod factory;
mod ollama;
mod openai;
mod tools;
mod transport;

pub use anthropic::AnthropicClient;
pub use client::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage, MAX_TOOL_ROUNDS,
};
pub use config::{LlmConfig, LlmProvider};
pub use factory::create_llm_client;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use tools::{NoopObserver, Tool, ToolCall, ToolDefinition, ToolObserver, ToolResult};
pub use transport::HttpTransport;
