//! Interaction loop
//!
//! A single foreground task owns the session and the presentation surface.
//! Completions run on spawned workers and come back over a channel that only
//! the loop reads, each tagged with the conversation it was dispatched for.

mod executor;
mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::InteractionLoop;
pub use traits::Presentation;

use crate::llm::{LlmError, Turn};

/// Input from the presentation surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    /// Plain text to send to the model
    Submit(String),
    ListConversations,
    SwitchConversation(String),
    ListMessages,
    DeleteMessage(i64),
    EditMessage(i64),
    Help,
    /// Input that could not be understood; the text is shown back
    Invalid(String),
    Quit,
}

/// Result of one worker, tagged with its dispatch-time conversation
#[derive(Debug)]
pub struct Completion {
    pub request_id: u64,
    pub conversation_id: String,
    pub result: Result<Turn, LlmError>,
}

/// Per-conversation interaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    AwaitingCompletion { outstanding: usize },
}

/// Whether the loop should keep running after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub const HELP_TEXT: &str = "\
Commands:
  /conversations      list conversations
  /switch <id>        switch to (or start) a conversation
  /messages           list stored messages of this conversation
  /delete <id>        delete a stored message
  /edit <id>          edit a stored message (not supported)
  /help               show this help
  /quit               exit
Anything else is sent to the model.";
