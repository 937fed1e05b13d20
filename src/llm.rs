//! Completion service abstraction
//!
//! Provides a common interface for opening streamed chat completions.

mod error;
mod openai;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAiClient;
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Ordered sequence of incremental chunks from one completion request.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, LlmError>>;

/// Common interface for streaming completion providers
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Open one chunked response sequence for the given request.
    ///
    /// Returns once the response has started; chunks are consumed from the
    /// returned stream in arrival order.
    async fn open_stream(&self, request: ChatRequest) -> Result<ChunkStream, LlmError>;
}
