//! Ollama chat API client for local inference.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage, MAX_TOOL_ROUNDS,
};
use super::tools::{run_tool_call, Tool, ToolCall, ToolObserver};
use super::transport::HttpTransport;

const DEFAULT_API_BASE: &str = "http://localhost:11434";

/// Ollama API client for local LLM inference.
///
/// Connects to a local Ollama server (default: http://localhost:11434).
/// No API key required.
pub struct OllamaClient {
    transport: HttpTransport,
    model: String,
    api_base: String,
}

impl OllamaClient {
    /// Create a new Ollama client with the specified model.
    ///
    /// # Arguments
    /// * `model` - Model name (e.g., "qwen2.5:latest", "llama3.1")
    pub fn new(model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            transport: HttpTransport::new("ollama", Duration::from_secs(120), 3)?,
            model: model.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Set a custom API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = transport;
        self
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        messages: Vec<OllamaMessage>,
        tools: Option<Vec<OllamaTool>>,
    ) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            options: OllamaOptions {
                // Ollama needs an explicit 0 for deterministic output
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            tools,
        }
    }

    async fn send(&self, body: &OllamaRequest) -> Result<OllamaResponse, LlmError> {
        let response: OllamaResponse = self
            .transport
            .post_json(
                &format!("{}/api/chat", self.api_base),
                &[],
                body,
                error_message,
            )
            .await?;
        self.transport.record_usage(&response.usage());
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool>>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

impl OllamaMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OllamaFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    message: OllamaMessage,
    /// Number of tokens in the response
    #[serde(default)]
    eval_count: u32,
    /// Number of tokens in the prompt
    #[serde(default)]
    prompt_eval_count: u32,
}

impl OllamaResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage {
            input_tokens: self.prompt_eval_count,
            output_tokens: self.eval_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<OllamaErrorResponse>(body)
        .ok()
        .map(|e| e.error)
}

fn initial_messages(request: &CompletionRequest) -> Vec<OllamaMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(OllamaMessage::new("system", system.clone()));
    }
    messages.push(OllamaMessage::new("user", request.prompt.clone()));
    messages
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request, initial_messages(&request), None);
        let response = self.send(&body).await?;

        Ok(CompletionResponse {
            usage: response.usage(),
            text: response.message.content,
            model: response.model,
            tool_calls: 0,
        })
    }

    async fn complete_with_tool(
        &self,
        request: CompletionRequest,
        tool: &dyn Tool,
        observer: &dyn ToolObserver,
    ) -> Result<CompletionResponse, LlmError> {
        let definition = tool.definition();
        let tools = vec![OllamaTool {
            kind: "function",
            function: OllamaFunction {
                name: definition.name,
                description: definition.description,
                parameters: definition.input_schema,
            },
        }];

        let mut messages = initial_messages(&request);
        let mut usage = LlmUsage::default();
        let mut tool_calls = 0;

        for round in 0..MAX_TOOL_ROUNDS {
            let body = self.build_request(&request, messages, Some(tools.clone()));
            let response = self.send(&body).await?;
            messages = body.messages;
            usage.add(response.usage());

            if response.message.tool_calls.is_empty() {
                return Ok(CompletionResponse {
                    text: response.message.content,
                    usage,
                    model: response.model,
                    tool_calls,
                });
            }

            // Ollama does not assign call ids.
            let calls: Vec<ToolCall> = response
                .message
                .tool_calls
                .iter()
                .enumerate()
                .map(|(i, call)| ToolCall {
                    id: format!("call_{}_{}", round, i),
                    name: call.function.name.clone(),
                    input: call.function.arguments.clone(),
                })
                .collect();

            messages.push(response.message);
            for call in &calls {
                let result = run_tool_call(tool, observer, call).await;
                messages.push(OllamaMessage::new("tool", result.content));
            }
            tool_calls += calls.len() as u32;
        }

        Err(LlmError::ToolLoop(format!(
            "no final answer after {} rounds",
            MAX_TOOL_ROUNDS
        )))
    }
}
