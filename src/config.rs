//! Environment-derived configuration

use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-5";
pub const DEFAULT_SEARCH_URL: &str = "http://localhost:5050";

/// Runtime configuration for the chat binary
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Completion service API key. Required before any turn can start.
    pub api_key: Option<String>,
    /// Completion service base URL override (gateway or local stand-in).
    pub api_base: Option<String>,
    /// Model identifier sent with every request.
    pub model: Option<String>,
    /// Search index service base URL.
    pub search_url: Option<String>,
    /// Where conversation history is persisted.
    pub history_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            api_base: std::env::var("SCHOLAR_API_BASE").ok(),
            model: std::env::var("SCHOLAR_MODEL").ok(),
            search_url: std::env::var("SCHOLAR_SEARCH_URL").ok(),
            history_path: std::env::var("SCHOLAR_HISTORY_PATH").ok().map(PathBuf::from),
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn search_url(&self) -> &str {
        self.search_url.as_deref().unwrap_or(DEFAULT_SEARCH_URL)
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_path.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".scholar-chat").join("history.json")
        })
    }
}
