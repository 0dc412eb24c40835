//! OpenAI-compatible chat completions client.
//!
//! Also used for custom endpoints that speak the same protocol
//! (vLLM, LM Studio, hosted gateways).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage, MAX_TOOL_ROUNDS,
};
use super::tools::{run_tool_call, Tool, ToolCall, ToolObserver};
use super::transport::HttpTransport;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible API client.
pub struct OpenAiClient {
    transport: HttpTransport,
    provider: &'static str,
    api_key: Option<String>,
    model: String,
    api_base: String,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            transport: HttpTransport::new("openai", Duration::from_secs(120), 3)?,
            provider: "openai",
            api_key,
            model: model.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Base URL including the version segment, e.g. `http://host:8000/v1`.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.provider = transport.provider();
        self.transport = transport;
        self
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        self.api_key
            .iter()
            .map(|key| ("authorization", format!("Bearer {}", key)))
            .collect()
    }

    async fn send(&self, body: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let response: ChatResponse = self
            .transport
            .post_json(
                &format!("{}/chat/completions", self.api_base),
                &self.headers(),
                body,
                error_message,
            )
            .await?;
        self.transport.record_usage(&response.usage());
        Ok(response)
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ChatTool>>,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ChatFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    /// JSON-encoded arguments.
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction,
}

#[derive(Debug, Clone, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

impl ChatResponse {
    fn usage(&self) -> LlmUsage {
        self.usage
            .map(|u| LlmUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default()
    }

    fn into_message(self) -> Result<(String, ChatMessage), LlmError> {
        let model = self.model;
        self.choices
            .into_iter()
            .next()
            .map(|choice| (model, choice.message))
            .ok_or_else(|| LlmError::Json("response contained no choices".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    error: ChatErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ChatError>(body)
        .ok()
        .map(|e| e.error.message)
}

fn initial_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(ChatMessage::new("system", system.clone()));
    }
    messages.push(ChatMessage::new("user", request.prompt.clone()));
    messages
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> &str {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request, initial_messages(&request), None);
        let response = self.send(&body).await?;
        let usage = response.usage();
        let (model, message) = response.into_message()?;

        Ok(CompletionResponse {
            text: message.content.unwrap_or_default(),
            usage,
            model,
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
        let tools = vec![ChatTool {
            kind: "function",
            function: ChatFunction {
                name: definition.name,
                description: definition.description,
                parameters: definition.input_schema,
            },
        }];

        let mut messages = initial_messages(&request);
        let mut usage = LlmUsage::default();
        let mut tool_calls = 0;

        for _ in 0..MAX_TOOL_ROUNDS {
            let body = self.build_request(&request, messages, Some(tools.clone()));
            let response = self.send(&body).await?;
            messages = body.messages;
            usage.add(response.usage());
            let (model, message) = response.into_message()?;

            if message.tool_calls.is_empty() {
                return Ok(CompletionResponse {
                    text: message.content.unwrap_or_default(),
                    usage,
                    model,
                    tool_calls,
                });
            }

            let calls: Vec<ToolCall> = message
                .tool_calls
                .iter()
                .map(|call| ToolCall {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    // Unparseable arguments reach the tool as a string and
                    // are rejected there.
                    input: serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| Value::String(call.function.arguments.clone())),
                })
                .collect();

            messages.push(message);
            for call in &calls {
                let result = run_tool_call(tool, observer, call).await;
                messages.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(result.content),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(result.call_id),
                });
            }
            tool_calls += calls.len() as u32;
        }

        Err(LlmError::ToolLoop(format!(
            "no final answer after {} rounds",
            MAX_TOOL_ROUNDS
        )))
    }
}
