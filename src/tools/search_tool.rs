//! Study search tool
//!
//! One call fans out one concurrent index query per phrase, merges the
//! results by document id, and serializes a bounded slice of the merge as
//! the response text.

use super::{Tool, ToolError};
use crate::search::{Document, SearchBackend};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// At most this many documents are serialized into one response.
const MAX_RESULTS: usize = 5;
/// Author lists are cut to this length before serialization.
const MAX_AUTHORS: usize = 3;

#[derive(Debug, Deserialize)]
struct SearchInput {
    queries: Vec<String>,
}

/// Keyword search over the study index
pub struct SearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl SearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Merge per-query result lists into one id-deduplicated list that
    /// keeps first-appearance order. A document returned by a later query
    /// does not replace the copy an earlier query produced.
    fn merge_results(result_sets: Vec<Vec<Document>>) -> Vec<Document> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged = Vec::new();
        for documents in result_sets {
            for document in documents {
                if seen.insert(document.id.clone()) {
                    merged.push(document);
                }
            }
        }
        merged
    }

    fn serialize_results(merged: Vec<Document>) -> Result<String, ToolError> {
        let rendered: Result<Vec<String>, _> = merged
            .into_iter()
            .take(MAX_RESULTS)
            .map(|mut document| {
                document.metadata.authors.truncate(MAX_AUTHORS);
                serde_json::to_string_pretty(&document)
            })
            .collect();

        rendered
            .map(|docs| docs.join("\n"))
            .map_err(|e| ToolError::Failed(format!("could not serialize results: {e}")))
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> String {
        "A keyword search tool to find study metadata. Use many specific search query strings \
         for best results. Each search should be no more than 5 words. Never use more than 3 \
         search strings"
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "List of search query keywords"
                }
            },
            "required": ["queries"],
            "additionalProperties": false
        })
    }

    async fn run(&self, arguments: Value) -> Result<String, ToolError> {
        let input: SearchInput = serde_json::from_value(arguments)
            .map_err(|e| ToolError::BadArguments(e.to_string()))?;

        // Independent reads: all phrases go out concurrently, the merge
        // below restores a deterministic order.
        let searches = input.queries.iter().map(|query| self.backend.search(query));
        let outcomes = join_all(searches).await;

        let mut result_sets = Vec::new();
        for (query, outcome) in input.queries.iter().zip(outcomes) {
            match outcome {
                Ok(documents) => {
                    tracing::debug!(query = %query, hits = documents.len(), "Search query returned");
                    result_sets.push(documents);
                }
                Err(e) => {
                    // A failed sub-query contributes nothing; the others
                    // still count.
                    tracing::warn!(query = %query, error = %e, "Search query failed");
                }
            }
        }

        let merged = Self::merge_results(result_sets);
        if merged.is_empty() {
            return Ok("No Results".to_string());
        }

        Self::serialize_results(merged)
    }
}
