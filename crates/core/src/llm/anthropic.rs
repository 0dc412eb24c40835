//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage, MAX_TOOL_ROUNDS,
};
use super::tools::{run_tool_call, Tool, ToolCall, ToolDefinition, ToolObserver};
use super::transport::HttpTransport;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client.
pub struct AnthropicClient {
    transport: HttpTransport,
    api_key: String,
    model: String,
    api_base: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            transport: HttpTransport::new("anthropic", Duration::from_secs(120), 3)?,
            api_key: api_key.into(),
            model: model.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

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
        messages: Vec<AnthropicMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages,
            temperature: if request.temperature == 0.0 {
                None // Anthropic treats 0 as default, so omit for deterministic
            } else {
                Some(request.temperature)
            },
            tools,
        }
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<AnthropicResponse, LlmError> {
        let headers = [
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", API_VERSION.to_string()),
        ];
        let response: AnthropicResponse = self
            .transport
            .post_json(
                &format!("{}/v1/messages", self.api_base),
                &headers,
                body,
                error_message,
            )
            .await?;
        self.transport.record_usage(&LlmUsage::from(response.usage));
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Block types this client does not handle (e.g. thinking).
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<AnthropicUsage> for LlmUsage {
    fn from(usage: AnthropicUsage) -> Self {
        LlmUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<AnthropicError>(body)
        .ok()
        .map(|e| e.error.message)
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn user_text(prompt: &str) -> AnthropicMessage {
    AnthropicMessage {
        role: "user",
        content: vec![ContentBlock::Text {
            text: prompt.to_string(),
        }],
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request, vec![user_text(&request.prompt)], None);
        let response = self.send(&body).await?;

        Ok(CompletionResponse {
            text: collect_text(&response.content),
            usage: response.usage.into(),
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
        let definitions = vec![tool.definition()];
        let mut messages = vec![user_text(&request.prompt)];
        let mut usage = LlmUsage::default();
        let mut tool_calls = 0;

        for _ in 0..MAX_TOOL_ROUNDS {
            let body = self.build_request(&request, messages, Some(definitions.clone()));
            let response = self.send(&body).await?;
            messages = body.messages;
            usage.add(response.usage.into());

            let calls: Vec<ToolCall> = response
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    }),
                    _ => None,
                })
                .collect();

            if calls.is_empty() {
                return Ok(CompletionResponse {
                    text: collect_text(&response.content),
                    usage,
                    model: response.model,
                    tool_calls,
                });
            }

            messages.push(AnthropicMessage {
                role: "assistant",
                content: response
                    .content
                    .into_iter()
                    .filter(|block| !matches!(block, ContentBlock::Other))
                    .collect(),
            });

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let result = run_tool_call(tool, observer, call).await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: result.call_id,
                    content: result.content,
                    is_error: result.is_error,
                });
            }
            tool_calls += calls.len() as u32;
            messages.push(AnthropicMessage {
                role: "user",
                content: results,
            });
        }

        Err(LlmError::ToolLoop(format!(
            "no final answer after {} rounds",
            MAX_TOOL_ROUNDS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tools::NoopObserver;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn spawn_stub(responses: Vec<Value>) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(Mutex::new(responses));
        let state = (seen.clone(), queue);

        let app = Router::new()
            .route(
                "/v1/messages",
                post(
                    |State((seen, queue)): State<(Seen, Arc<Mutex<Vec<Value>>>)>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        assert_eq!(headers["x-api-key"], "sk-test");
                        assert_eq!(headers["anthropic-version"], API_VERSION);
                        seen.lock().unwrap().push(body);
                        Json(queue.lock().unwrap().remove(0))
                    },
                ),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    fn text_response(text: &str) -> Value {
        json!({
            "content": [{"type": "text", "text": text}],
            "model": "claude-test",
            "usage": {"input_tokens": 12, "output_tokens": 4}
        })
    }

    struct SubmitTool;

    #[async_trait]
    impl Tool for SubmitTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "submit".to_string(),
                description: "Submit".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, _input: &Value) -> Result<String, String> {
            Ok("accepted".to_string())
        }
    }

    #[tokio::test]
    async fn test_complete_sends_messages_request() {
        let (base, seen) = spawn_stub(vec![text_response(r#"{"summary": "X"}"#)]).await;
        let client = AnthropicClient::new("sk-test", "claude-test")
            .unwrap()
            .with_api_base(base);

        let response = client
            .complete(CompletionRequest::new("Analyze this").with_max_tokens(256))
            .await
            .unwrap();

        assert_eq!(response.text, r#"{"summary": "X"}"#);
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.model, "claude-test");

        let body = &seen.lock().unwrap()[0];
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["content"][0]["text"], "Analyze this");
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let tool_use = json!({
            "content": [
                {"type": "text", "text": "Submitting."},
                {"type": "tool_use", "id": "toolu_1", "name": "submit", "input": {"summary": "Y"}}
            ],
            "model": "claude-test",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let (base, seen) = spawn_stub(vec![tool_use, text_response("Done.")]).await;
        let client = AnthropicClient::new("sk-test", "claude-test")
            .unwrap()
            .with_api_base(base);

        let response = client
            .complete_with_tool(CompletionRequest::new("Analyze"), &SubmitTool, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(response.text, "Done.");
        assert_eq!(response.tool_calls, 1);
        assert_eq!(response.usage.input_tokens, 22);

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["tools"][0]["name"], "submit");
        let followup = &requests[1]["messages"];
        assert_eq!(followup[1]["role"], "assistant");
        assert_eq!(followup[1]["content"][1]["type"], "tool_use");
        assert_eq!(followup[2]["content"][0]["type"], "tool_result");
        assert_eq!(followup[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(followup[2]["content"][0]["content"], "accepted");
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async {
                (
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"type": "error", "error": {"type": "rate_limit_error", "message": "Rate limited"}})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = AnthropicClient::new("sk-test", "claude-test")
            .unwrap()
            .with_api_base(format!("http://{}", addr));
        let err = client.complete(CompletionRequest::new("hi")).await.unwrap_err();

        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Rate limited");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_blocks_are_tolerated() {
        let blocks: Vec<ContentBlock> = serde_json::from_value(json!([
            {"type": "thinking", "thinking": "hmm", "signature": "sig"},
            {"type": "text", "text": "answer"}
        ]))
        .unwrap();
        assert!(matches!(blocks[0], ContentBlock::Other));
        assert_eq!(collect_text(&blocks), "answer");
    }
}
