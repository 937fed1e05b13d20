//! Conversation engine: turn-taking state machine and tool loop
//!
//! One engine instance owns one conversation: its history, its readiness
//! gate, and the live stream handle for the turn in flight. History is
//! mutated only here (the scrubber repairs persisted history before it is
//! handed in); the stream handle is mutated only by its accumulator task.

#[cfg(test)]
pub mod testing;

use crate::llm::{ChatMessage, ChatRequest, CompletionService};
use crate::stream::{spawn_stream, StreamHandle};
use crate::tools::ToolRegistry;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;

/// Turn-taking phase of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Ready for user input.
    #[default]
    Idle,
    /// A completion stream is being accumulated.
    Streaming,
    /// Tool calls from the last assistant message are executing.
    ToolProcessing,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("conversation is busy, wait for the current turn to settle")]
    Busy,
    #[error("the model turn ended in an error state")]
    TurnFailed,
}

struct Inner {
    history: Vec<ChatMessage>,
    stream: Option<StreamHandle>,
    phase: Phase,
}

/// Drives submit → stream → (tool loop)* → settle for one conversation.
pub struct ConversationEngine {
    service: Arc<dyn CompletionService>,
    tools: ToolRegistry,
    model: String,
    inner: Mutex<Inner>,
    phase_tx: watch::Sender<Phase>,
}

impl ConversationEngine {
    /// Construct with a seed history. Externally-loaded history must have
    /// been scrubbed before it is passed in.
    pub fn new(
        service: Arc<dyn CompletionService>,
        tools: ToolRegistry,
        model: impl Into<String>,
        history: Vec<ChatMessage>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            service,
            tools,
            model: model.into(),
            inner: Mutex::new(Inner {
                history,
                stream: None,
                phase: Phase::Idle,
            }),
            phase_tx,
        }
    }

    /// Whether the caller may submit new input.
    ///
    /// False while tool calls are processing, and while a live stream has
    /// not reached its terminal chunk.
    #[allow(dead_code)] // Input gate for embedding UIs
    pub fn ready(&self) -> bool {
        Self::is_ready(&self.lock())
    }

    /// Observe phase changes (the readiness gate for a UI).
    #[allow(dead_code)] // Live-rendering hook for embedding UIs
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// Snapshot of the conversation history.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock().history.clone()
    }

    /// Handle to the assistant message currently being streamed, if any.
    #[allow(dead_code)] // Live-rendering hook for embedding UIs
    pub fn live_stream(&self) -> Option<StreamHandle> {
        self.lock().stream.clone()
    }

    /// Abandon the turn in flight, best-effort. Partial history already
    /// appended stays; the in-progress assistant message is discarded.
    pub fn cancel(&self) {
        if let Some(stream) = &self.lock().stream {
            stream.stop();
        }
    }

    /// Submit user input and drive the turn until it settles: stream the
    /// assistant reply, execute any tool calls sequentially, resume the
    /// model with the extended history, and repeat until an assistant turn
    /// carries no tool calls.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), EngineError> {
        {
            let mut inner = self.lock();
            if !Self::is_ready(&inner) {
                return Err(EngineError::Busy);
            }
            inner.history.push(ChatMessage::user(text.into()));
        }
        self.run_turn().await
    }

    async fn run_turn(&self) -> Result<(), EngineError> {
        loop {
            let request = self.build_request();
            let handle = spawn_stream(self.service.clone(), request);
            {
                let mut inner = self.lock();
                inner.stream = Some(handle.clone());
                Self::set_phase(&self.phase_tx, &mut inner, Phase::Streaming);
            }

            let snapshot = handle.settled().await;

            // Settle: fold the finished message into history and decide
            // whether the turn continues into tool processing.
            let calls = {
                let mut inner = self.lock();
                inner.stream = None;

                if !snapshot.done {
                    // Abandoned via cancel; nothing to fold.
                    tracing::debug!("Turn abandoned before the stream settled");
                    Self::set_phase(&self.phase_tx, &mut inner, Phase::Idle);
                    return Ok(());
                }
                if snapshot.error {
                    tracing::warn!("Turn settled in an error state");
                    Self::set_phase(&self.phase_tx, &mut inner, Phase::Idle);
                    return Err(EngineError::TurnFailed);
                }

                let calls = snapshot.tool_calls.clone().unwrap_or_default();
                if snapshot.has_payload() {
                    inner.history.push(snapshot.into_message());
                } else {
                    // Empty text and no tool calls: a non-event.
                    tracing::debug!("Dropping empty assistant message");
                }

                if calls.is_empty() {
                    Self::set_phase(&self.phase_tx, &mut inner, Phase::Idle);
                    return Ok(());
                }
                Self::set_phase(&self.phase_tx, &mut inner, Phase::ToolProcessing);
                calls
            };

            // Strictly sequential: each response is committed to history
            // before the next call starts, so replaying the history is
            // deterministic.
            for call in &calls {
                let response = self.tools.dispatch(call).await;
                self.lock().history.push(response);
            }

            tracing::debug!(tool_calls = calls.len(), "Resuming model with tool results");
        }
    }

    fn build_request(&self) -> ChatRequest {
        let inner = self.lock();
        ChatRequest {
            model: self.model.clone(),
            messages: inner.history.clone(),
            stream: true,
            tools: self.tools.definitions(),
        }
    }

    fn is_ready(inner: &Inner) -> bool {
        match inner.phase {
            Phase::ToolProcessing => false,
            Phase::Streaming => inner.stream.as_ref().is_none_or(StreamHandle::is_done),
            Phase::Idle => true,
        }
    }

    fn set_phase(tx: &watch::Sender<Phase>, inner: &mut Inner, phase: Phase) {
        inner.phase = phase;
        tx.send_replace(phase);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
