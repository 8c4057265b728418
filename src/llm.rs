//! Chat transport abstraction
//!
//! One streamed chat-completion call per user turn, aggregated into a single
//! assistant turn.

mod error;
mod ollama;
mod stream;
mod types;


pub use error::LlmError;
#[cfg(test)]
pub use error::LlmErrorKind;
pub use ollama::{OllamaService, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_TIMEOUT};
pub use types::*;

#[cfg(test)]
pub(crate) use stream::{aggregate, test_helpers};

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for chat transports
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Send the full history and return the aggregated assistant reply.
    /// No retries are attempted.
    async fn complete_chat(&self, model: &str, history: &[Turn]) -> Result<Turn, LlmError>;
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn complete_chat(&self, model: &str, history: &[Turn]) -> Result<Turn, LlmError> {
        (**self).complete_chat(model, history).await
    }
}

/// Logging wrapper for chat transports
pub struct LoggingService<S> {
    inner: S,
}

impl<S: LlmService> LoggingService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: LlmService> LlmService for LoggingService<S> {
    async fn complete_chat(&self, model: &str, history: &[Turn]) -> Result<Turn, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete_chat(model, history).await;
        let duration = start.elapsed();

        match &result {
            Ok(turn) => {
                tracing::info!(
                    model = %model,
                    duration_ms = %duration.as_millis(),
                    history_len = history.len(),
                    reply_chars = turn.content.chars().count(),
                    "Chat request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %model,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "Chat request failed"
                );
            }
        }

        result
    }
}
