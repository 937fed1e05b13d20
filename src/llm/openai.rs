//! `OpenAI`-compatible streaming chat-completions client

use super::types::{ChatRequest, StreamChunk};
use super::{ChunkStream, CompletionService, LlmError};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Streaming client for the chat/completions endpoint
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a client. `base_url` overrides the public endpoint, e.g. for
    /// a gateway or a local stand-in during development.
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::auth("No API key configured"));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn open_stream(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Opening completion stream"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read error response: {e}")))?;

            if let Ok(error_resp) = serde_json::from_str::<ApiErrorResponse>(&body) {
                let message = error_resp.error.message;
                return Err(match status.as_u16() {
                    401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
                    429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
                    400 => LlmError::invalid_request(format!("Invalid request: {message}")),
                    500..=599 => LlmError::server_error(format!("Server error: {message}")),
                    _ => LlmError::unknown(format!("HTTP {status}: {message}")),
                });
            }
            return Err(LlmError::unknown(format!("HTTP {status} error: {body}")));
        }

        let chunks = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let terminal = matches!(event, Ok(e) if e.data == DONE_SENTINEL);
                futures::future::ready(!terminal)
            })
            .filter_map(|event| {
                futures::future::ready(match event {
                    Ok(e) => Some(decode_chunk(&e.data)),
                    Err(e) => Some(Err(LlmError::network(format!("Stream read failed: {e}")))),
                })
            })
            .boxed();

        Ok(chunks)
    }
}

/// Last SSE event of a completed stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Decode one SSE data payload into a chunk.
///
/// The service reports mid-stream failures as an `error` object in place of
/// a chunk, so that shape is checked before the chunk schema.
fn decode_chunk(data: &str) -> Result<StreamChunk, LlmError> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| LlmError::protocol(format!("Unparseable stream event: {e}")))?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("stream error");
        return Err(LlmError::server_error(format!("Stream error: {message}")));
    }

    serde_json::from_value(value)
        .map_err(|e| LlmError::protocol(format!("Unexpected chunk shape: {e}")))
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
