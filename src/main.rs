//! scholar-chat - research assistant chat over a study search index
//!
//! A terminal front end for the conversation engine: reads user input,
//! drives the turn loop (streaming completion plus tool calls), and
//! persists the conversation across sessions.

mod config;
mod engine;
mod history;
mod llm;
mod search;
mod stream;
mod system_prompt;
mod tools;

use config::Config;
use engine::ConversationEngine;
use history::HistoryStore;
use llm::{ChatMessage, OpenAiClient};
use search::HttpSearchClient;
use std::io::Write;
use std::sync::Arc;
use tools::ToolRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they do not interleave with the chat itself.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scholar_chat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();

    let Some(api_key) = config.api_key.clone() else {
        tracing::error!("No API key configured. Set OPENAI_API_KEY.");
        return Err("missing API key".into());
    };

    let service = Arc::new(OpenAiClient::new(api_key, config.api_base.as_deref())?);
    let search = Arc::new(HttpSearchClient::new(config.search_url())?);
    let store = HistoryStore::new(config.history_path());

    // Anything loaded from disk has already been scrubbed by the store.
    let loaded = store.load();
    tracing::info!(
        messages = loaded.len(),
        model = config.model(),
        "Conversation loaded"
    );

    let engine = Arc::new(ConversationEngine::new(
        service,
        ToolRegistry::new(search),
        config.model(),
        loaded,
    ));

    // Ctrl-C abandons the turn in flight instead of killing the session.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Cancelling in-flight turn");
                engine.cancel();
            }
        });
    }

    println!("scholar-chat - ask about studies ('exit' to quit)");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" {
            break;
        }

        let before = engine.history().len();
        match engine.submit(input).await {
            Ok(()) => {
                for message in engine.history().iter().skip(before) {
                    if let ChatMessage::Assistant { content, .. } = message {
                        if !content.is_empty() {
                            println!("{content}");
                        }
                    }
                }
            }
            Err(e) => {
                println!("[turn failed: {e}]");
            }
        }

        if let Err(e) = store.save(&engine.history()) {
            tracing::warn!(error = %e, "Could not persist history");
        }
    }

    store.save(&engine.history())?;
    Ok(())
}
