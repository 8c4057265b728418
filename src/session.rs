//! Conversation session
//!
//! Owns the in-memory turn history of the active conversation. Completions
//! are reconciled against the conversation id they were dispatched under, so
//! a reply that arrives after a switch is persisted to its own conversation
//! but never merged into the one now on screen.

mod store;

pub use store::{DatabaseStore, TurnStore};

use crate::db::DbResult;
use crate::llm::{Role, Turn};

/// Conversation bound at startup
pub const DEFAULT_CONVERSATION: &str = "default";

/// Outcome of reconciling a completed reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The reply belongs to the active conversation and was appended
    Appended,
    /// The conversation was switched since dispatch; persisted only
    Stale,
}

pub struct ConversationSession<S> {
    store: S,
    active: String,
    history: Vec<Turn>,
}

impl<S: TurnStore> ConversationSession<S> {
    /// Empty session bound to the default conversation
    pub fn new(store: S) -> Self {
        Self {
            store,
            active: DEFAULT_CONVERSATION.to_string(),
            history: Vec::new(),
        }
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append a user turn, persist it under the active conversation and
    /// return the history to send with the completion request.
    ///
    /// A failed write is logged and the in-memory append is kept.
    pub async fn append_user_turn(&mut self, turn: Turn) -> Vec<Turn> {
        debug_assert_eq!(turn.role, Role::User);

        if let Err(e) = self
            .store
            .append(&self.active, Role::User, &turn.content)
            .await
        {
            tracing::error!(conv_id = %self.active, error = %e, "Failed to persist user turn");
        }
        self.history.push(turn);
        self.snapshot_history()
    }

    /// Persist a completed reply under `dispatched_for` and append it to the
    /// live history only if that conversation is still active.
    pub async fn reconcile_assistant_turn(&mut self, dispatched_for: &str, turn: Turn) -> Reconciled {
        if let Err(e) = self
            .store
            .append(dispatched_for, Role::Assistant, &turn.content)
            .await
        {
            tracing::error!(conv_id = %dispatched_for, error = %e, "Failed to persist assistant turn");
        }

        if dispatched_for == self.active {
            self.history.push(turn);
            Reconciled::Appended
        } else {
            tracing::info!(
                conv_id = %dispatched_for,
                active = %self.active,
                "Completion arrived after conversation switch; persisted only"
            );
            Reconciled::Stale
        }
    }

    /// Load `conversation_id` and make it active. On failure the session is
    /// left exactly as it was.
    pub async fn switch_to(&mut self, conversation_id: &str) -> DbResult<()> {
        let records = self.store.list_turns(conversation_id).await?;
        self.history = records.iter().map(crate::db::TurnRecord::to_turn).collect();
        self.active = conversation_id.to_string();
        tracing::info!(conv_id = %self.active, turns = self.history.len(), "Switched conversation");
        Ok(())
    }

    pub fn snapshot_history(&self) -> Vec<Turn> {
        self.history.clone()
    }
}
