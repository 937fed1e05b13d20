//! Conversation history repair and persistence
//!
//! Persisted history can be truncated mid-turn (crash, user clearing
//! state), leaving tool calls without responses or responses without
//! calls. The scrubber is the sole repair mechanism: it runs once on any
//! externally-loaded history before that history re-enters live state.

#[cfg(test)]
mod proptests;

use crate::llm::{ChatMessage, ToolCall};
use crate::system_prompt::SYSTEM_PROMPT;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Restore the pairing invariant: every surviving tool call has exactly one
/// surviving response, and every surviving response references a surviving
/// call.
///
/// Pass one walks forward collecting unanswered call ids; a response
/// arriving before (or without) its call is an orphan. Pass two drops
/// unanswered calls (unsetting an emptied `tool_calls` field) and orphan
/// responses.
pub fn scrub_dangling_tool_calls(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut unanswered: HashSet<String> = HashSet::new();
    let mut orphan_responses: HashSet<String> = HashSet::new();

    for message in &messages {
        match message {
            ChatMessage::Assistant {
                tool_calls: Some(calls),
                ..
            } => {
                for call in calls {
                    unanswered.insert(call.id().to_string());
                }
            }
            ChatMessage::Tool { tool_call_id, .. } => {
                if !unanswered.remove(tool_call_id) {
                    orphan_responses.insert(tool_call_id.clone());
                }
            }
            _ => {}
        }
    }

    if !unanswered.is_empty() || !orphan_responses.is_empty() {
        tracing::info!(
            dropped_calls = unanswered.len(),
            dropped_responses = orphan_responses.len(),
            "Scrubbed dangling tool calls from loaded history"
        );
    }

    messages
        .into_iter()
        .filter_map(|message| match message {
            ChatMessage::Assistant {
                content,
                tool_calls: Some(calls),
            } => {
                let kept: Vec<ToolCall> = calls
                    .into_iter()
                    .filter(|call| !unanswered.contains(call.id()))
                    .collect();
                Some(ChatMessage::Assistant {
                    content,
                    tool_calls: if kept.is_empty() { None } else { Some(kept) },
                })
            }
            ChatMessage::Tool { tool_call_id, .. }
                if orphan_responses.contains(&tool_call_id) =>
            {
                None
            }
            other => Some(other),
        })
        .collect()
}

/// A brand new history: just the system instruction.
pub fn seed_history() -> Vec<ChatMessage> {
    vec![ChatMessage::system(SYSTEM_PROMPT)]
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not write history file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// JSON file persistence for one conversation's history
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load and repair persisted history. A missing, empty, or unreadable
    /// file yields a fresh seeded history; anything loaded goes through the
    /// scrubber before it is returned.
    pub fn load(&self) -> Vec<ChatMessage> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return seed_history(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not read history file, starting fresh");
                return seed_history();
            }
        };

        let messages: Vec<ChatMessage> = match serde_json::from_str(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt history file, starting fresh");
                return seed_history();
            }
        };

        if messages.is_empty() {
            return seed_history();
        }

        scrub_dangling_tool_calls(messages)
    }

    /// Persist the full history, replacing the previous snapshot.
    pub fn save(&self, history: &[ChatMessage]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_string_pretty(history)?;
        std::fs::write(&self.path, encoded)?;
        Ok(())
    }
}
