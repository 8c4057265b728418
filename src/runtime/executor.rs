//! Interaction loop executor

use super::traits::Presentation;
use super::{Completion, Control, LoopState, UserEvent, HELP_TEXT};

use crate::llm::{LlmService, Role, Turn};
use crate::session::{ConversationSession, Reconciled, TurnStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Longest content shown per line when listing stored messages
const PREVIEW_CHARS: usize = 60;

/// Generic interaction loop that can work with any store, transport and
/// presentation implementations
pub struct InteractionLoop<S, L, P>
where
    S: TurnStore,
    L: LlmService + 'static,
    P: Presentation,
{
    session: ConversationSession<S>,
    llm: Arc<L>,
    presentation: P,
    model: String,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    /// Outstanding completions per dispatch-time conversation
    in_flight: HashMap<String, usize>,
    next_request_id: u64,
}

impl<S, L, P> InteractionLoop<S, L, P>
where
    S: TurnStore,
    L: LlmService + 'static,
    P: Presentation,
{
    pub fn new(
        session: ConversationSession<S>,
        llm: L,
        presentation: P,
        model: impl Into<String>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            session,
            llm: Arc::new(llm),
            presentation,
            model: model.into(),
            completion_tx,
            completion_rx,
            in_flight: HashMap::new(),
            next_request_id: 0,
        }
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn session(&self) -> &ConversationSession<S> {
        &self.session
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn state(&self, conversation_id: &str) -> LoopState {
        match self.in_flight.get(conversation_id) {
            Some(&outstanding) if outstanding > 0 => LoopState::AwaitingCompletion { outstanding },
            _ => LoopState::Idle,
        }
    }

    /// Process user events and completions until the user quits or the
    /// input side closes. Completions still in flight at that point are
    /// abandoned.
    pub async fn run(mut self, mut events: mpsc::Receiver<UserEvent>) {
        tracing::info!(conv_id = %self.session.active(), model = %self.model, "Starting interaction loop");

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if self.handle_event(event).await == Control::Quit {
                        break;
                    }
                }
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion).await;
                }
            }
        }

        let outstanding: usize = self.in_flight.values().sum();
        tracing::info!(outstanding, "Interaction loop stopped");
    }

    pub async fn handle_event(&mut self, event: UserEvent) -> Control {
        match event {
            UserEvent::Submit(text) => self.submit(text).await,
            UserEvent::ListConversations => self.list_conversations().await,
            UserEvent::SwitchConversation(id) => {
                self.switch_to(&id).await;
            }
            UserEvent::ListMessages => self.list_messages().await,
            UserEvent::DeleteMessage(id) => self.delete_message(id).await,
            UserEvent::EditMessage(id) => {
                tracing::info!(message_id = id, conv_id = %self.session.active(), "Edit requested");
                self.presentation
                    .notice(&format!("Editing message {id} is not supported."));
            }
            UserEvent::Help => self.presentation.notice(HELP_TEXT),
            UserEvent::Invalid(reason) => {
                self.presentation.notice(&format!("{reason}\n\n{HELP_TEXT}"));
            }
            UserEvent::Quit => return Control::Quit,
        }
        Control::Continue
    }

    /// `Idle` -> `AwaitingCompletion`: append, persist, then dispatch a worker
    /// with the snapshot
    async fn submit(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }

        self.presentation.render_turn(Role::User, &text);
        let snapshot = self.session.append_user_turn(Turn::user(text)).await;
        self.dispatch(snapshot);
    }

    fn dispatch(&mut self, history: Vec<Turn>) {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let conversation_id = self.session.active().to_string();
        *self.in_flight.entry(conversation_id.clone()).or_default() += 1;

        let llm = self.llm.clone();
        let model = self.model.clone();
        let completion_tx = self.completion_tx.clone();

        tracing::debug!(request_id, conv_id = %conversation_id, history_len = history.len(), "Dispatching completion");
        tokio::spawn(async move {
            let result = llm.complete_chat(&model, &history).await;
            // The loop owns the receiver; if it is gone nobody needs the result
            let _ = completion_tx.send(Completion {
                request_id,
                conversation_id,
                result,
            });
        });
    }

    /// Wait for the next worker result. The loop keeps a sender, so this
    /// only returns `None` if called with nothing ever dispatched and the
    /// channel closed.
    #[allow(dead_code)] // Used by tests to step the loop
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completion_rx.recv().await
    }

    /// `AwaitingCompletion` -> `Idle`: reconcile the reply (or an error turn)
    /// into the session and render it if still current
    pub async fn handle_completion(&mut self, completion: Completion) {
        let Completion {
            request_id,
            conversation_id,
            result,
        } = completion;

        if let Some(outstanding) = self.in_flight.get_mut(&conversation_id) {
            *outstanding = outstanding.saturating_sub(1);
            if *outstanding == 0 {
                self.in_flight.remove(&conversation_id);
            }
        }

        let turn = match result {
            Ok(turn) => turn,
            Err(e) => {
                tracing::warn!(request_id, conv_id = %conversation_id, error = %e, kind = e.kind.as_str(), "Completion failed");
                Turn::assistant(format!("Error: {e}"))
            }
        };

        let content = turn.content.clone();
        match self
            .session
            .reconcile_assistant_turn(&conversation_id, turn)
            .await
        {
            Reconciled::Appended => self.presentation.render_turn(Role::Assistant, &content),
            Reconciled::Stale => {
                tracing::debug!(request_id, conv_id = %conversation_id, "Reply not rendered; conversation no longer active");
            }
        }
    }

    /// Load and redraw a conversation. Returns whether it is now active.
    async fn switch_to(&mut self, conversation_id: &str) -> bool {
        let conversation_id = conversation_id.trim();
        if conversation_id.is_empty() {
            self.presentation.notice("Usage: /switch <conversation id>");
            return false;
        }

        match self.session.switch_to(conversation_id).await {
            Ok(()) => {
                self.redraw();
                true
            }
            Err(e) => {
                tracing::error!(conv_id = %conversation_id, error = %e, "Failed to load conversation");
                self.presentation
                    .notice(&format!("Could not load conversation {conversation_id}: {e}"));
                false
            }
        }
    }

    fn redraw(&mut self) {
        self.presentation.clear(self.session.active());
        for turn in self.session.history() {
            self.presentation.render_turn(turn.role, &turn.content);
        }
    }

    async fn list_conversations(&mut self) {
        let mut ids = match self.session.store().list_conversation_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list conversations");
                self.presentation
                    .notice(&format!("Could not list conversations: {e}"));
                return;
            }
        };

        // The active conversation may not have anything persisted yet
        let active = self.session.active().to_string();
        if !ids.contains(&active) {
            ids.push(active.clone());
            ids.sort();
        }

        let lines: Vec<String> = ids
            .iter()
            .map(|id| {
                let marker = if *id == active { '*' } else { ' ' };
                format!("{marker} {id}")
            })
            .collect();
        self.presentation
            .notice(&format!("Conversations:\n{}", lines.join("\n")));
    }

    async fn list_messages(&mut self) {
        let active = self.session.active().to_string();
        let records = match self.session.store().list_turns(&active).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(conv_id = %active, error = %e, "Failed to list messages");
                self.presentation.notice(&format!("Could not list messages: {e}"));
                return;
            }
        };

        if records.is_empty() {
            self.presentation
                .notice(&format!("No stored messages in conversation {active}."));
            return;
        }

        let lines: Vec<String> = records
            .iter()
            .map(|r| format!("{} [{}] {}", r.id, r.role, preview(&r.content)))
            .collect();
        self.presentation.notice(&format!(
            "Messages in conversation {active}:\n{}",
            lines.join("\n")
        ));
    }

    /// Delete one record of the active conversation
    async fn delete_message(&mut self, id: i64) {
        let active = self.session.active().to_string();
        let owned = match self.session.store().list_turns(&active).await {
            Ok(records) => records.iter().any(|r| r.id == id),
            Err(e) => {
                tracing::error!(message_id = id, conv_id = %active, error = %e, "Failed to look up message");
                self.presentation
                    .notice(&format!("Could not delete message {id}: {e}"));
                return;
            }
        };
        if !owned {
            self.presentation.notice(&format!(
                "Could not delete message {id}: not in conversation {active}"
            ));
            return;
        }

        if let Err(e) = self.session.store().delete(id).await {
            tracing::error!(message_id = id, error = %e, "Failed to delete message");
            self.presentation
                .notice(&format!("Could not delete message {id}: {e}"));
            return;
        }
        tracing::info!(message_id = id, "Deleted message");

        // Reload so the live history matches the durable record again
        if self.switch_to(&active).await {
            self.presentation.notice(&format!("Deleted message {id}."));
        }
    }
}

/// First line of `content`, cut to a fixed number of characters
fn preview(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or_default();
    let mut out: String = first_line.chars().take(PREVIEW_CHARS).collect();
    if first_line.chars().count() > PREVIEW_CHARS || content.lines().count() > 1 {
        out.push_str("...");
    }
    out
}
