//! Keyword-search capability client
//!
//! The index backend is opaque to the engine: one GET per phrase against
//! `/find`, returning study metadata documents. Everything past that
//! (ranking, index shape) lives on the other side of the wire.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One study in the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<Author>,
    pub published_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub surname: String,
    pub given_names: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(String),
    #[error("search returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("search response was not valid document JSON: {0}")]
    Decode(String),
}

/// Interface to the keyword search index
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Look up documents matching one phrase.
    async fn search(&self, phrase: &str) -> Result<Vec<Document>, SearchError>;
}

/// HTTP client for the search index service
pub struct HttpSearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SearchError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SearchBackend for HttpSearchClient {
    async fn search(&self, phrase: &str) -> Result<Vec<Document>, SearchError> {
        tracing::debug!(phrase = %phrase, "Issuing search");

        let response = self
            .client
            .get(format!("{}/find", self.base_url))
            .query(&[("phrase", phrase)])
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        response
            .json::<Vec<Document>>()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))
    }
}
