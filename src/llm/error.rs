//! Chat transport error types

use thiserror::Error;

/// Transport client error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Transport, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Decode, message)
    }

    pub fn empty_response() -> Self {
        Self::new(
            LlmErrorKind::EmptyResponse,
            "received empty chat response from Ollama API",
        )
    }

    /// Map a reqwest failure onto a transport error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::transport(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::transport(format!("Connection failed: {e}"))
        } else {
            Self::transport(format!("Request failed: {e}"))
        }
    }
}

/// Error classification. None of these are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection refused, timeout, broken body, non-success status
    Transport,
    /// A stream fragment did not match the partial-response shape
    Decode,
    /// Stream finished cleanly but carried no content
    EmptyResponse,
}

impl LlmErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::EmptyResponse => "empty_response",
        }
    }
}
