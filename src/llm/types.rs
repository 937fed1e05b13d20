//! Common types for the chat completion wire format
//!
//! The history is stored in the same shape the completion service accepts,
//! so a request body is just the history plus the tool declarations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single message in a conversation.
///
/// Tagged by `role` to match the chat-completions message schema, which is
/// also the persisted form. A `tool` message answers exactly one tool call
/// from a preceding assistant message via `tool_call_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        ChatMessage::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }
}

/// A finalized tool invocation request emitted by the model.
///
/// The service can emit call kinds we do not execute; anything that is not
/// a function call is carried as `Custom` and answered with a diagnostic
/// tool message by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCall {
    Function { id: String, function: FunctionCall },
    Custom { id: String },
}

impl ToolCall {
    /// Identifier, unique within the assistant turn that created the call.
    pub fn id(&self) -> &str {
        match self {
            ToolCall::Function { id, .. } | ToolCall::Custom { id } => id,
        }
    }
}

/// Name plus raw argument text of a function-style tool call.
///
/// Arguments are expected to be JSON but are not validated until dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A partial tool-call fragment from one stream chunk.
///
/// Keyed by `index` (position in the in-progress call list, not a stable
/// id). Fragments for the same index arrive in order: the id and name are
/// sent once at call start, argument text arrives in pieces.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Why the service terminated a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    ContentFilter,
    Length,
    #[serde(other)]
    Other,
}

/// One incremental chunk of a streamed completion.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl StreamChunk {
    /// The first (and for our requests, only) choice of this chunk.
    pub fn first_choice(self) -> Option<ChunkChoice> {
        self.choices.into_iter().next()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: MessageDelta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental assistant-message content carried by one chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A streaming completion request: model, full history, tool declarations.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool schema entry declared to the completion service.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            kind: "function",
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
                strict: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub strict: bool,
}
