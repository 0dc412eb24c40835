//! Tool-mode support: the `submit_analysis` tool and the observer that
//! reacts to its results.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::llm::{Tool, ToolCall, ToolDefinition, ToolObserver, ToolResult};
use crate::notification::Notifier;

pub const SUBMIT_TOOL_NAME: &str = "submit_analysis";

/// System prompt used in tool mode.
pub const TOOL_MODE_INSTRUCTIONS: &str = "Submit your analysis by calling the submit_analysis \
tool exactly once with the JSON object as its input. After the tool accepts it, reply with a \
one-line confirmation.";

/// Tool through which the model hands over its structured analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitAnalysisTool;

#[async_trait]
impl Tool for SubmitAnalysisTool {
    fn definition(&self) -> ToolDefinition {
        let nullable_string = json!({"type": ["string", "null"]});
        let string_list = json!({"type": "array", "items": {"type": "string"}});

        ToolDefinition {
            name: SUBMIT_TOOL_NAME.to_string(),
            description: "Submit the structured analysis of the CV.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "personal_info": {"type": ["object", "null"]},
                    "summary": nullable_string,
                    "skills": {"type": ["object", "null"]},
                    "experience": {"type": ["array", "null"], "items": {"type": "object"}},
                    "education": {"type": ["array", "null"], "items": {"type": "object"}},
                    "certifications": string_list,
                    "highlights": string_list,
                    "recommendations": string_list
                },
                "required": ["summary"]
            }),
        }
    }

    async fn invoke(&self, input: &Value) -> Result<String, String> {
        if input.is_object() {
            Ok("Analysis received.".to_string())
        } else {
            Err("The analysis must be a JSON object.".to_string())
        }
    }
}

/// What the observer saw during one tool conversation.
#[derive(Debug, Default)]
pub struct Submission {
    /// Input of the first accepted `submit_analysis` call.
    pub analysis: Option<Value>,
    /// True once the success notification was created.
    pub notified: bool,
}

/// Records the first accepted submission and fires the success
/// notification at that moment.
pub struct SubmissionObserver<'a> {
    analysis_id: &'a str,
    notifier: &'a Notifier,
    state: Mutex<Submission>,
}

impl<'a> SubmissionObserver<'a> {
    pub fn new(analysis_id: &'a str, notifier: &'a Notifier) -> Self {
        Self {
            analysis_id,
            notifier,
            state: Mutex::new(Submission::default()),
        }
    }

    pub fn finish(self) -> Submission {
        self.state.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl ToolObserver for SubmissionObserver<'_> {
    fn on_tool_result(&self, call: &ToolCall, result: &ToolResult) {
        if result.is_error || call.name != SUBMIT_TOOL_NAME {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.analysis.is_some() {
            return;
        }
        state.analysis = Some(call.input.clone());

        match self.notifier.emit_success(self.analysis_id) {
            Ok(_) => {
                info!(analysis_id = self.analysis_id, "Analysis submitted through tool");
                state.notified = true;
            }
            Err(e) => {
                // The processor notifies once the record is committed.
                error!(analysis_id = self.analysis_id, error = %e, "Failed to notify on tool submission");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{
        NotificationConfig, NotificationFilter, NotificationStore, SqliteNotificationStore,
    };
    use std::sync::Arc;

    fn notifier() -> (Notifier, Arc<SqliteNotificationStore>) {
        let store = Arc::new(SqliteNotificationStore::in_memory().unwrap());
        (
            Notifier::new(store.clone(), NotificationConfig::default()),
            store,
        )
    }

    fn submit_call(input: Value) -> ToolCall {
        ToolCall {
            id: "call-1".to_string(),
            name: SUBMIT_TOOL_NAME.to_string(),
            input,
        }
    }

    fn ok_result() -> ToolResult {
        ToolResult {
            call_id: "call-1".to_string(),
            content: "Analysis received.".to_string(),
            is_error: false,
        }
    }

    #[tokio::test]
    async fn test_tool_rejects_non_objects() {
        let tool = SubmitAnalysisTool;
        assert!(tool.invoke(&json!({"summary": "ok"})).await.is_ok());
        assert!(tool.invoke(&json!("just text")).await.is_err());
        assert!(tool.invoke(&json!([1, 2])).await.is_err());
    }

    #[test]
    fn test_definition_is_named_for_submission() {
        let def = SubmitAnalysisTool.definition();
        assert_eq!(def.name, SUBMIT_TOOL_NAME);
        assert_eq!(def.input_schema["type"], "object");
    }

    #[test]
    fn test_first_submission_notifies_once() {
        let (notifier, store) = notifier();
        let observer = SubmissionObserver::new("a-1", &notifier);

        observer.on_tool_result(&submit_call(json!({"summary": "first"})), &ok_result());
        observer.on_tool_result(&submit_call(json!({"summary": "second"})), &ok_result());

        let submission = observer.finish();
        assert!(submission.notified);
        assert_eq!(submission.analysis, Some(json!({"summary": "first"})));
        assert_eq!(store.list(&NotificationFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_rejected_calls_are_ignored() {
        let (notifier, store) = notifier();
        let observer = SubmissionObserver::new("a-1", &notifier);

        let rejected = ToolResult {
            is_error: true,
            ..ok_result()
        };
        observer.on_tool_result(&submit_call(json!("bad")), &rejected);

        let submission = observer.finish();
        assert!(!submission.notified);
        assert!(submission.analysis.is_none());
        assert_eq!(store.unread_count().unwrap(), 0);
    }
}
