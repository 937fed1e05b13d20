//! Mock implementations for testing
//!
//! Scripted completion streams and a fixture search backend so the engine
//! loop runs without real I/O.

use crate::llm::{
    ChatRequest, ChunkChoice, ChunkStream, CompletionService, FinishReason, FunctionDelta,
    LlmError, MessageDelta, StreamChunk, ToolCallDelta,
};
use crate::search::{Document, SearchBackend, SearchError};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

// ============================================================================
// Chunk builders
// ============================================================================

pub fn text_chunk(text: &str) -> StreamChunk {
    StreamChunk {
        choices: vec![ChunkChoice {
            delta: MessageDelta {
                content: Some(text.to_string()),
                tool_calls: None,
            },
            finish_reason: None,
        }],
    }
}

pub fn tool_delta_chunk(
    index: u32,
    id: Option<&str>,
    name: Option<&str>,
    arguments: Option<&str>,
) -> StreamChunk {
    StreamChunk {
        choices: vec![ChunkChoice {
            delta: MessageDelta {
                content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: id.map(str::to_string),
                    function: Some(FunctionDelta {
                        name: name.map(str::to_string),
                        arguments: arguments.map(str::to_string),
                    }),
                }]),
            },
            finish_reason: None,
        }],
    }
}

pub fn finish_chunk(reason: FinishReason) -> StreamChunk {
    StreamChunk {
        choices: vec![ChunkChoice {
            delta: MessageDelta::default(),
            finish_reason: Some(reason),
        }],
    }
}

// ============================================================================
// Scripted completion service
// ============================================================================

enum Scripted {
    Chunks(Vec<Result<StreamChunk, LlmError>>),
    OpenError(LlmError),
    Manual {
        rx: mpsc::UnboundedReceiver<Result<StreamChunk, LlmError>>,
        opened: oneshot::Sender<()>,
    },
}

/// Completion service that replays queued streams
pub struct ScriptedService {
    scripts: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a stream that yields the given chunks, then ends.
    pub fn queue_stream(&self, chunks: Vec<StreamChunk>) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Scripted::Chunks(chunks.into_iter().map(Ok).collect()));
    }

    /// Queue a stream that fails mid-flight after the given chunks.
    pub fn queue_stream_with_error(&self, chunks: Vec<StreamChunk>, error: LlmError) {
        let mut items: Vec<Result<StreamChunk, LlmError>> =
            chunks.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.scripts.lock().unwrap().push_back(Scripted::Chunks(items));
    }

    /// Queue a failure to open the stream at all.
    pub fn queue_open_error(&self, error: LlmError) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Scripted::OpenError(error));
    }

    /// Queue a stream the test drives by hand. Returns the chunk sender and
    /// a receiver that fires once the engine has opened the stream.
    pub fn queue_manual_stream(
        &self,
    ) -> (
        mpsc::UnboundedSender<Result<StreamChunk, LlmError>>,
        oneshot::Receiver<()>,
    ) {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = oneshot::channel();
        self.scripts.lock().unwrap().push_back(Scripted::Manual {
            rx: chunk_rx,
            opened: opened_tx,
        });
        (chunk_tx, opened_rx)
    }

    /// Every request the engine issued, in order.
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn open_stream(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        self.requests.lock().unwrap().push(request);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::OpenError(LlmError::unknown("no scripted stream queued")));

        match script {
            Scripted::Chunks(chunks) => Ok(futures::stream::iter(chunks).boxed()),
            Scripted::OpenError(error) => Err(error),
            Scripted::Manual { rx, opened } => {
                let _ = opened.send(());
                Ok(UnboundedReceiverStream::new(rx).boxed())
            }
        }
    }
}

// ============================================================================
// Fixture search backend
// ============================================================================

/// Search backend serving canned results per phrase; unknown phrases return
/// an empty result list.
pub struct FixtureSearch {
    results: HashMap<String, Vec<Document>>,
}

impl FixtureSearch {
    pub fn empty() -> Self {
        Self {
            results: HashMap::new(),
        }
    }

    pub fn with_results(entries: Vec<(&str, Vec<Document>)>) -> Self {
        Self {
            results: entries
                .into_iter()
                .map(|(phrase, docs)| (phrase.to_string(), docs))
                .collect(),
        }
    }
}

#[async_trait]
impl SearchBackend for FixtureSearch {
    async fn search(&self, phrase: &str) -> Result<Vec<Document>, SearchError> {
        Ok(self.results.get(phrase).cloned().unwrap_or_default())
    }
}
