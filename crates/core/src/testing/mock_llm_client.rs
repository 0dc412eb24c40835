//! Mock LLM client for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::llm::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage, Tool, ToolCall,
    ToolObserver, ToolResult, MAX_TOOL_ROUNDS,
};

/// Reply used when nothing is queued.
pub const DEFAULT_REPLY: &str = r#"{"summary": "Mock analysis"}"#;

enum MockReply {
    Text(String),
    Error(LlmError),
    ToolCall { name: String, input: Value },
}

type RequestHook = Box<dyn Fn() + Send + Sync>;

/// Mock implementation of the LlmClient trait.
///
/// Replies are served in the order they were queued. A queued tool call is
/// executed against the tool passed to `complete_with_tool`, with the
/// observer notified exactly as a real provider client would do it.
///
/// # Example
///
/// ```rust,ignore
/// use cvlens_core::testing::MockLlmClient;
///
/// let llm = MockLlmClient::new();
/// llm.push_tool_call("submit_analysis", json!({"summary": "ok"}));
/// llm.push_text("Submitted.");
/// ```
pub struct MockLlmClient {
    model: String,
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    hook: Mutex<Option<RequestHook>>,
}

impl std::fmt::Debug for MockLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmClient")
            .field("model", &self.model)
            .field("replies", &"<replies>")
            .field("requests", &"<requests>")
            .finish()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        }
    }

    /// Queue a final text answer.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(MockReply::Text(text.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: LlmError) {
        self.push(MockReply::Error(error));
    }

    /// Queue a tool call. Outside a tool conversation it is answered as text.
    pub fn push_tool_call(&self, name: impl Into<String>, input: Value) {
        self.push(MockReply::ToolCall {
            name: name.into(),
            input,
        });
    }

    /// Run `hook` at the start of every request.
    pub fn on_request(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn push(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::Text(DEFAULT_REPLY.to_string()))
    }

    fn record(&self, request: CompletionRequest) {
        self.requests.lock().unwrap().push(request);
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook();
        }
    }

    fn response(&self, text: String, tool_calls: u32) -> CompletionResponse {
        CompletionResponse {
            text,
            usage: LlmUsage {
                input_tokens: 100,
                output_tokens: 20,
            },
            model: self.model.clone(),
            tool_calls,
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.record(request);
        match self.next_reply() {
            MockReply::Text(text) => Ok(self.response(text, 0)),
            MockReply::Error(e) => Err(e),
            MockReply::ToolCall { input, .. } => Ok(self.response(input.to_string(), 0)),
        }
    }

    async fn complete_with_tool(
        &self,
        request: CompletionRequest,
        tool: &dyn Tool,
        observer: &dyn ToolObserver,
    ) -> Result<CompletionResponse, LlmError> {
        self.record(request);

        let mut tool_calls = 0u32;
        for round in 0..MAX_TOOL_ROUNDS {
            match self.next_reply() {
                MockReply::Text(text) => return Ok(self.response(text, tool_calls)),
                MockReply::Error(e) => return Err(e),
                MockReply::ToolCall { name, input } => {
                    let call = ToolCall {
                        id: format!("mock_call_{}", round),
                        name,
                        input,
                    };
                    observer.on_tool_call(&call);

                    let outcome = if call.name == tool.definition().name {
                        tool.invoke(&call.input).await
                    } else {
                        Err(format!("Unknown tool: {}", call.name))
                    };
                    let result = match outcome {
                        Ok(content) => ToolResult {
                            call_id: call.id.clone(),
                            content,
                            is_error: false,
                        },
                        Err(content) => ToolResult {
                            call_id: call.id.clone(),
                            content,
                            is_error: true,
                        },
                    };
                    observer.on_tool_result(&call, &result);
                    tool_calls += 1;
                }
            }
        }

        Err(LlmError::ToolLoop(format!(
            "no final answer after {} rounds",
            MAX_TOOL_ROUNDS
        )))
    }
}
