//! Tool implementations and dispatch
//!
//! The dispatcher maps a finalized tool call to exactly one `tool` message.
//! It never fails: every failure path resolves to a diagnostic response
//! carrying the originating call's id, so the history stays structurally
//! valid and the conversation can continue.

mod search_tool;

pub use search_tool::SearchTool;

use crate::llm::{ChatMessage, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Diagnostic responses for calls that never reach a handler.
const UNSUPPORTED_CALL: &str = "error - unsupported tool call";
const UNKNOWN_TOOL: &str = "error - unknown tool name";
const MALFORMED_JSON: &str = "Error - malformed json";
const BAD_ARGUMENTS: &str = "error - bad arguments";

/// Handler failure, converted to a diagnostic tool message by the registry.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments parsed as JSON but did not match the handler's input shape.
    #[error("arguments did not match the tool's schema: {0}")]
    BadArguments(String),
    /// The handler itself failed while running.
    #[error("tool execution failed: {0}")]
    Failed(String),
}

/// Trait for tools the model may invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, as declared to the completion service
    fn name(&self) -> &'static str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool arguments
    fn input_schema(&self) -> Value;

    /// Execute the tool against already-parsed JSON arguments, producing
    /// the response text. Handlers validate their own input shape.
    async fn run(&self, arguments: Value) -> Result<String, ToolError>;
}

/// Collection of tools available to a conversation
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Standard registry: the study search tool.
    pub fn new(search: Arc<dyn crate::search::SearchBackend>) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(SearchTool::new(search))];
        Self { tools }
    }

    /// Registry with an explicit tool set.
    #[allow(dead_code)] // Used by tests
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Tool schema declarations for the completion request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition::function(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Execute one finalized tool call and produce its `tool` response.
    ///
    /// Resolution order: non-function calls are unsupported; unknown names
    /// are rejected; argument text that is not JSON is rejected; a handler
    /// failure becomes a bad-arguments diagnostic. Never returns an error -
    /// the response message is the error channel.
    pub async fn dispatch(&self, call: &ToolCall) -> ChatMessage {
        let ToolCall::Function { id, function } = call else {
            tracing::warn!(call_id = %call.id(), "Unsupported tool call kind");
            return ChatMessage::tool(call.id(), UNSUPPORTED_CALL);
        };

        let Some(tool) = self.tools.iter().find(|t| t.name() == function.name) else {
            tracing::warn!(call_id = %id, name = %function.name, "Unknown tool name");
            return ChatMessage::tool(id, UNKNOWN_TOOL);
        };

        let arguments: Value = match serde_json::from_str(&function.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                tracing::warn!(call_id = %id, name = %function.name, error = %e, "Malformed tool arguments");
                return ChatMessage::tool(id, MALFORMED_JSON);
            }
        };

        match tool.run(arguments).await {
            Ok(content) => {
                tracing::debug!(call_id = %id, name = %function.name, "Tool call completed");
                ChatMessage::tool(id, content)
            }
            Err(e) => {
                tracing::warn!(call_id = %id, name = %function.name, error = %e, "Tool call failed");
                ChatMessage::tool(id, BAD_ARGUMENTS)
            }
        }
    }
}
