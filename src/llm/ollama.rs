//! Ollama `/api/chat` transport

use super::stream::aggregate;
use super::types::{Role, Turn};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Streaming chat client for a local Ollama server
pub struct OllamaService {
    client: Client,
    base_url: String,
    max_tokens: u32,
}

impl OllamaService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::transport(format!("Failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::info!(base_url = %base_url, timeout_secs = timeout.as_secs(), "Ollama client initialized");

        Ok(Self {
            client,
            base_url,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn translate_request<'a>(&self, model: &'a str, history: &'a [Turn]) -> ChatRequest<'a> {
        ChatRequest {
            model,
            messages: history.iter().map(translate_turn).collect(),
            options: ChatOptions {
                max_tokens: self.max_tokens,
            },
            stream: true,
        }
    }
}

fn translate_turn(turn: &Turn) -> ChatMessage<'_> {
    ChatMessage {
        role: turn.role,
        content: &turn.content,
        images: (!turn.images.is_empty()).then_some(turn.images.as_slice()),
    }
}

#[async_trait]
impl LlmService for OllamaService {
    async fn complete_chat(&self, model: &str, history: &[Turn]) -> Result<Turn, LlmError> {
        let request = self.translate_request(model, history);
        tracing::debug!(
            model = %model,
            messages = request.messages.len(),
            "Sending chat request to Ollama API"
        );

        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::transport(format!("HTTP {status} error: {body}")));
        }

        let content = aggregate(response.bytes_stream()).await?;
        Ok(Turn::new(Role::Assistant, content))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub options: ChatOptions,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: Role,
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatOptions {
    pub max_tokens: u32,
}
