//! Stream accumulation for in-flight assistant messages
//!
//! One [`StreamHandle`] owns one assistant message under construction. A
//! spawned task folds chunks into a watch cell in arrival order, so
//! observers see the partial content and partial tool-call list on every
//! update. Once the terminal chunk arrives the snapshot is stable.

#[cfg(test)]
mod proptests;

use crate::llm::{
    ChatMessage, ChatRequest, CompletionService, FinishReason, FunctionCall, ToolCall,
    ToolCallDelta,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of an in-flight assistant message.
#[derive(Debug, Clone, Default)]
pub struct StreamSnapshot {
    /// Text content accumulated so far.
    pub content: String,
    /// Tool calls reconstructed from the deltas received so far.
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set once the terminal chunk has been applied. Stable afterwards.
    pub done: bool,
    /// Set on transport failure or a content-filter termination.
    pub error: bool,
}

impl StreamSnapshot {
    /// Whether this snapshot carries anything worth persisting.
    pub fn has_payload(&self) -> bool {
        !self.content.is_empty() || self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Fold the snapshot into a history message.
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::assistant(self.content, self.tool_calls)
    }
}

/// Handle to one in-flight assistant message.
///
/// Cheap to clone; all clones observe the same underlying cell. Dropping
/// every handle does not stop the accumulator task - use [`Self::stop`].
#[derive(Debug, Clone)]
pub struct StreamHandle {
    rx: watch::Receiver<StreamSnapshot>,
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Current view of the partial message.
    pub fn snapshot(&self) -> StreamSnapshot {
        self.rx.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.rx.borrow().done
    }

    #[allow(dead_code)] // State query for embedding UIs
    pub fn is_err(&self) -> bool {
        self.rx.borrow().error
    }

    /// Subscribe to every update of the partial message.
    #[allow(dead_code)] // Live-rendering hook for embedding UIs
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.rx.clone()
    }

    /// Abandon the stream. Updates stop being applied from this point; the
    /// handle stays valid and keeps its last snapshot. The remote transfer
    /// is not guaranteed to be interrupted.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait until the stream settles: either the terminal chunk was applied
    /// (`done`) or the accumulator quit early (cancellation, in which case
    /// the returned snapshot is the last partial state, not done).
    pub async fn settled(&self) -> StreamSnapshot {
        let mut rx = self.rx.clone();
        loop {
            if rx.borrow().done {
                return rx.borrow().clone();
            }
            if rx.changed().await.is_err() {
                // Accumulator gone without marking done: abandoned stream.
                return rx.borrow().clone();
            }
        }
    }
}

/// Open a completion stream and return a live handle to it immediately.
///
/// The accumulator task applies chunks strictly in arrival order. On the
/// terminal chunk it finalizes tool calls, flags content-filter terminations
/// as errors, marks the snapshot done and consumes nothing further. A
/// failure to open or read the stream marks the snapshot done and errored,
/// which settles the turn so the caller may retry.
pub fn spawn_stream(service: Arc<dyn CompletionService>, request: ChatRequest) -> StreamHandle {
    let (tx, rx) = watch::channel(StreamSnapshot::default());
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        accumulate(service, request, &tx, &task_cancel).await;
    });

    StreamHandle { rx, cancel }
}

async fn accumulate(
    service: Arc<dyn CompletionService>,
    request: ChatRequest,
    tx: &watch::Sender<StreamSnapshot>,
    cancel: &CancellationToken,
) {
    use futures::StreamExt;

    let mut chunks = match service.open_stream(request).await {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::error!(
                error = %e,
                retryable = e.kind.is_retryable(),
                "Failed to open completion stream"
            );
            tx.send_modify(|s| {
                s.error = true;
                s.done = true;
            });
            return;
        }
    };

    let mut deltas: Vec<ToolCallDelta> = Vec::new();

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Stream abandoned by caller");
                return;
            }
            next = chunks.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                tracing::error!(
                    error = %e,
                    retryable = e.kind.is_retryable(),
                    "Completion stream failed mid-flight"
                );
                tx.send_modify(|s| {
                    s.error = true;
                    s.done = true;
                });
                return;
            }
            None => {
                // Stream ended without a terminal reason. Finalize with what
                // arrived so the turn can settle.
                tracing::warn!("Completion stream ended without a finish reason");
                let calls = merge_tool_deltas(&deltas);
                tx.send_modify(|s| {
                    s.tool_calls = calls;
                    s.done = true;
                });
                return;
            }
        };

        let Some(choice) = chunk.first_choice() else {
            continue;
        };

        if let Some(reason) = choice.finish_reason {
            let calls = merge_tool_deltas(&deltas);
            tx.send_modify(|s| {
                s.tool_calls = calls;
                if reason == FinishReason::ContentFilter {
                    s.error = true;
                }
                s.done = true;
            });
            // No further chunks are consumed past the terminal reason.
            return;
        }

        if let Some(batch) = choice.delta.tool_calls {
            deltas.extend(batch);
            let partial = merge_tool_deltas(&deltas);
            tx.send_modify(|s| s.tool_calls = partial);
        }

        if let Some(text) = choice.delta.content {
            tx.send_modify(|s| s.content.push_str(&text));
        }
    }
}

/// Fold an ordered delta sequence into finalized tool calls.
///
/// Returns `None` for an empty sequence. One call per distinct index, in
/// order of first appearance of that index. Per index: the id and the name
/// are set once (first fragment carrying them wins), argument fragments
/// concatenate in arrival order.
pub fn merge_tool_deltas(deltas: &[ToolCallDelta]) -> Option<Vec<ToolCall>> {
    if deltas.is_empty() {
        return None;
    }

    // Indices are small, dense, and arrive roughly in order; an
    // insertion-ordered list with linear lookup beats a map here.
    let mut builders: Vec<(u32, CallBuilder)> = Vec::new();

    for delta in deltas {
        let existing = builders.iter().position(|(index, _)| *index == delta.index);
        let slot = match existing {
            Some(slot) => slot,
            None => {
                builders.push((delta.index, CallBuilder::default()));
                builders.len() - 1
            }
        };
        let builder = &mut builders[slot].1;

        if builder.id.is_none() {
            builder.id.clone_from(&delta.id);
        }
        if let Some(function) = &delta.function {
            if builder.name.is_none() {
                builder.name.clone_from(&function.name);
            }
            if let Some(fragment) = &function.arguments {
                builder.arguments.push_str(fragment);
            }
        }
    }

    Some(
        builders
            .into_iter()
            .map(|(_, builder)| ToolCall::Function {
                id: builder.id.unwrap_or_default(),
                function: FunctionCall {
                    name: builder.name.unwrap_or_default(),
                    arguments: builder.arguments,
                },
            })
            .collect(),
    )
}

#[derive(Debug, Default)]
struct CallBuilder {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}
