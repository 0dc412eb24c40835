//! Tool calling: definitions, invocation and observation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool input.
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned call id (synthesized when the provider has none).
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Outcome of a tool invocation, sent back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// A callable the model may invoke mid-conversation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. `Err` is reported to the model as a failed call.
    async fn invoke(&self, input: &Value) -> Result<String, String>;
}

/// Receives tool activity from a model client.
///
/// Both hooks run inline in the conversation, before the result is sent
/// back to the model.
pub trait ToolObserver: Send + Sync {
    fn on_tool_call(&self, _call: &ToolCall) {}

    fn on_tool_result(&self, _call: &ToolCall, _result: &ToolResult) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ToolObserver for NoopObserver {}

/// Execute one call against `tool`, notifying `observer` around it.
pub(crate) async fn run_tool_call(
    tool: &dyn Tool,
    observer: &dyn ToolObserver,
    call: &ToolCall,
) -> ToolResult {
    observer.on_tool_call(call);

    let expected = tool.definition().name;
    let outcome = if call.name == expected {
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
        Err(message) => ToolResult {
            call_id: call.id.clone(),
            content: message,
            is_error: true,
        },
    };

    debug!(tool = %call.name, is_error = result.is_error, "Tool call finished");
    observer.on_tool_result(call, &result);
    result
}
