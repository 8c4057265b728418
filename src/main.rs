//! Ollama chat - terminal chat client for a local Ollama server
//!
//! Streams replies from the Ollama chat API, keeps every turn in `SQLite` and
//! lets the user switch between named conversations while replies are still
//! in flight.

mod config;
mod console;
mod db;
mod llm;
mod runtime;
mod session;

use config::Config;
use console::ConsolePresentation;
use db::Database;
use llm::{LoggingService, OllamaService};
use runtime::{InteractionLoop, UserEvent};
use session::{ConversationSession, DatabaseStore, DEFAULT_CONVERSATION};
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    // Logs go to a file; stdout belongs to the chat
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ollama_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    tracing::info!(
        model = %config.model,
        base_url = %config.base_url,
        "Application started"
    );

    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let llm = LoggingService::new(
        OllamaService::new(&config.base_url, config.timeout)?.with_max_tokens(config.max_tokens),
    );
    let session = ConversationSession::new(DatabaseStore::new(db));
    let stdout = std::io::stdout();
    let styled = stdout.is_terminal();
    let presentation = ConsolePresentation::new(stdout, &config.model, styled);

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(console::read_input(tokio::io::stdin(), tx));

    let mut interaction = InteractionLoop::new(session, llm, presentation, &config.model);
    interaction
        .handle_event(UserEvent::SwitchConversation(DEFAULT_CONVERSATION.to_string()))
        .await;
    interaction.run(rx).await;

    tracing::info!("Application stopped");
    Ok(())
}
