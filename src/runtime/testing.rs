//! Mock implementations for testing
//!
//! These mocks enable integration testing of the interaction loop without
//! real I/O.

use crate::db::{DbError, DbResult, TurnRecord};
use crate::llm::{LlmError, LlmService, Role, Turn};
use crate::runtime::Presentation;
use crate::session::TurnStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

// ============================================================================
// Scripted LLM client
// ============================================================================

type Reply = Result<String, LlmError>;

/// Transport whose replies are released by the test, keyed by the text of
/// the last user turn in the request
#[derive(Default)]
pub struct ScriptedLlm {
    gates: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
    /// Histories received, in call order
    pub requests: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending reply for `prompt`; send on the returned channel
    /// to let that completion finish
    pub fn gate(&self, prompt: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(prompt.to_string(), rx);
        tx
    }

    /// Register an immediately available reply
    pub fn reply(&self, prompt: &str, text: &str) {
        self.gate(prompt).send(Ok(text.to_string())).unwrap();
    }

    pub fn recorded_requests(&self) -> Vec<Vec<Turn>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete_chat(&self, _model: &str, history: &[Turn]) -> Result<Turn, LlmError> {
        self.requests.lock().unwrap().push(history.to_vec());

        let prompt = history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        let gate = self.gates.lock().unwrap().remove(&prompt);

        match gate {
            Some(rx) => match rx.await {
                Ok(Ok(text)) => Ok(Turn::assistant(text)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(LlmError::transport("Scripted reply dropped")),
            },
            None => Err(LlmError::transport(format!("No scripted reply for {prompt:?}"))),
        }
    }
}

// ============================================================================
// Recording presentation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Turn(Role, String),
    Clear(String),
    Notice(String),
}

/// Presentation that records every call; clones share the same log
#[derive(Clone, Default)]
pub struct RecordingPresentation {
    log: Arc<Mutex<Vec<Shown>>>,
}

impl RecordingPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<Shown> {
        self.log.lock().unwrap().clone()
    }

    /// Rendered turns only
    pub fn turns(&self) -> Vec<(Role, String)> {
        self.shown()
            .into_iter()
            .filter_map(|s| match s {
                Shown::Turn(role, content) => Some((role, content)),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.shown()
            .into_iter()
            .filter_map(|s| match s {
                Shown::Notice(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_notice(&self) -> Option<String> {
        self.shown().into_iter().rev().find_map(|s| match s {
            Shown::Notice(text) => Some(text),
            _ => None,
        })
    }
}

impl Presentation for RecordingPresentation {
    fn render_turn(&mut self, role: Role, content: &str) {
        self.log
            .lock()
            .unwrap()
            .push(Shown::Turn(role, content.to_string()));
    }

    fn clear(&mut self, conversation_id: &str) {
        self.log
            .lock()
            .unwrap()
            .push(Shown::Clear(conversation_id.to_string()));
    }

    fn notice(&mut self, text: &str) {
        self.log.lock().unwrap().push(Shown::Notice(text.to_string()));
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store for testing. Records every append call and can be told
/// to fail writes or reads.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<TurnRecord>>,
    next_id: Mutex<i64>,
    /// `(conversation, role, content)` of every append, including failed ones
    pub appends: Mutex<Vec<(String, Role, String)>>,
    fail_writes: AtomicBool,
    /// Successful `list_turns` calls left before reads start failing
    reads_left: Mutex<Option<usize>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads_after(&self, successful: usize) {
        *self.reads_left.lock().unwrap() = Some(successful);
    }

    pub fn contents(&self, conversation_id: &str) -> Vec<(Role, String)> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.conversation_id == conversation_id)
            .map(|r| (r.role, r.content.clone()))
            .collect()
    }

    pub fn recorded_appends(&self) -> Vec<(String, Role, String)> {
        self.appends.lock().unwrap().clone()
    }
}

#[async_trait]
impl TurnStore for InMemoryStore {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> DbResult<i64> {
        self.appends
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), role, content.to_string()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Sqlite(rusqlite::Error::InvalidQuery));
        }

        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = *next_id;
        drop(next_id);

        self.records.lock().unwrap().push(TurnRecord {
            id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: chrono::Utc::now(),
        });
        Ok(id)
    }

    async fn list_turns(&self, conversation_id: &str) -> DbResult<Vec<TurnRecord>> {
        if let Some(left) = self.reads_left.lock().unwrap().as_mut() {
            if *left == 0 {
                return Err(DbError::Sqlite(rusqlite::Error::InvalidQuery));
            }
            *left -= 1;
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn list_conversation_ids(&self) -> DbResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.conversation_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn delete(&self, id: i64) -> DbResult<()> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(DbError::MessageNotFound(id));
        }
        Ok(())
    }

    async fn update(&self, id: i64, content: &str) -> DbResult<()> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == id) {
            Some(r) => {
                r.content = content.to_string();
                Ok(())
            }
            None => Err(DbError::MessageNotFound(id)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::llm::LlmErrorKind;
    use crate::runtime::{Control, InteractionLoop, LoopState, UserEvent};
    use crate::session::{ConversationSession, DatabaseStore};
    use std::time::Duration;
    use tokio::sync::mpsc;

    type TestLoop = InteractionLoop<Arc<InMemoryStore>, Arc<ScriptedLlm>, RecordingPresentation>;

    struct Harness {
        store: Arc<InMemoryStore>,
        llm: Arc<ScriptedLlm>,
        shown: RecordingPresentation,
        interaction: TestLoop,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let llm = Arc::new(ScriptedLlm::new());
        let shown = RecordingPresentation::new();
        let interaction = InteractionLoop::new(
            ConversationSession::new(store.clone()),
            llm.clone(),
            shown.clone(),
            "llama3.2",
        );
        Harness {
            store,
            llm,
            shown,
            interaction,
        }
    }

    fn pairs(turns: &[Turn]) -> Vec<(Role, String)> {
        turns.iter().map(|t| (t.role, t.content.clone())).collect()
    }

    fn user(s: &str) -> (Role, String) {
        (Role::User, s.to_string())
    }

    fn assistant(s: &str) -> (Role, String) {
        (Role::Assistant, s.to_string())
    }

    async fn submit(h: &mut Harness, text: &str) {
        let control = h
            .interaction
            .handle_event(UserEvent::Submit(text.to_string()))
            .await;
        assert_eq!(control, Control::Continue);
    }

    async fn step(h: &mut Harness) {
        let completion = tokio::time::timeout(Duration::from_secs(2), h.interaction.next_completion())
            .await
            .expect("completion should arrive")
            .expect("channel open");
        h.interaction.handle_completion(completion).await;
    }

    /// Worked example: "hi" streamed back as "He" + "llo"
    #[tokio::test]
    async fn test_hi_hello_through_real_aggregation() {
        use crate::llm::aggregate;
        use crate::llm::test_helpers::{chunk_stream, record};

        struct StreamingLlm;

        #[async_trait]
        impl LlmService for StreamingLlm {
            async fn complete_chat(&self, _model: &str, _history: &[Turn]) -> Result<Turn, LlmError> {
                let body = record("He", false) + &record("llo", true);
                let content = aggregate(chunk_stream(vec![body.into_bytes()])).await?;
                Ok(Turn::assistant(content))
            }
        }

        let store = Arc::new(InMemoryStore::new());
        let shown = RecordingPresentation::new();
        let mut interaction = InteractionLoop::new(
            ConversationSession::new(store.clone()),
            StreamingLlm,
            shown.clone(),
            "llama3.2",
        );

        interaction
            .handle_event(UserEvent::Submit("hi".to_string()))
            .await;
        let completion = interaction.next_completion().await.unwrap();
        assert_eq!(completion.conversation_id, "default");
        interaction.handle_completion(completion).await;

        let user_appends: Vec<_> = store
            .recorded_appends()
            .into_iter()
            .filter(|(_, role, _)| *role == Role::User)
            .collect();
        assert_eq!(
            user_appends,
            vec![("default".to_string(), Role::User, "hi".to_string())]
        );

        assert_eq!(
            pairs(interaction.session().history()),
            vec![user("hi"), assistant("Hello")]
        );
        assert_eq!(store.contents("default"), vec![user("hi"), assistant("Hello")]);
        assert_eq!(shown.turns(), vec![user("hi"), assistant("Hello")]);
    }

    #[tokio::test]
    async fn test_state_tracks_outstanding_completions() {
        let mut h = harness();
        let gate = h.llm.gate("hi");

        assert_eq!(h.interaction.state("default"), LoopState::Idle);
        submit(&mut h, "hi").await;
        assert_eq!(
            h.interaction.state("default"),
            LoopState::AwaitingCompletion { outstanding: 1 }
        );

        gate.send(Ok("Hello".to_string())).unwrap();
        step(&mut h).await;
        assert_eq!(h.interaction.state("default"), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_switch_while_in_flight_keeps_new_conversation_clean() {
        let mut h = harness();
        h.store.append("b", Role::User, "b-old").await.unwrap();
        let gate = h.llm.gate("question for default");

        submit(&mut h, "question for default").await;
        h.interaction
            .handle_event(UserEvent::SwitchConversation("b".to_string()))
            .await;
        assert_eq!(h.interaction.session().active(), "b");

        gate.send(Ok("answer for default".to_string())).unwrap();
        step(&mut h).await;

        // B's live history is untouched and nothing new was rendered
        assert_eq!(pairs(h.interaction.session().history()), vec![user("b-old")]);
        let shown = h.shown.shown();
        let after_clear = shown
            .iter()
            .skip_while(|s| **s != Shown::Clear("b".to_string()))
            .skip(1)
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(after_clear, vec![Shown::Turn(Role::User, "b-old".to_string())]);

        // The original conversation still got its reply on record
        assert_eq!(
            h.store.contents("default"),
            vec![user("question for default"), assistant("answer for default")]
        );
        assert_eq!(h.store.contents("b"), vec![user("b-old")]);
        assert_eq!(h.interaction.state("default"), LoopState::Idle);

        // Coming back shows the reconciled reply
        h.interaction
            .handle_event(UserEvent::SwitchConversation("default".to_string()))
            .await;
        assert_eq!(
            pairs(h.interaction.session().history()),
            vec![user("question for default"), assistant("answer for default")]
        );
    }

    #[tokio::test]
    async fn test_completions_land_in_completion_order() {
        let mut h = harness();
        let gate1 = h.llm.gate("turn1");
        let gate2 = h.llm.gate("turn2");

        submit(&mut h, "turn1").await;
        submit(&mut h, "turn2").await;
        assert_eq!(
            h.interaction.state("default"),
            LoopState::AwaitingCompletion { outstanding: 2 }
        );

        gate2.send(Ok("reply2".to_string())).unwrap();
        step(&mut h).await;
        gate1.send(Ok("reply1".to_string())).unwrap();
        step(&mut h).await;

        let expected = vec![
            user("turn1"),
            user("turn2"),
            assistant("reply2"),
            assistant("reply1"),
        ];
        assert_eq!(pairs(h.interaction.session().history()), expected);
        assert_eq!(h.store.contents("default"), expected);
        assert_eq!(h.shown.turns(), expected);
    }

    #[tokio::test]
    async fn test_full_history_is_sent() {
        let mut h = harness();
        h.llm.reply("first", "one");
        submit(&mut h, "first").await;
        step(&mut h).await;

        h.llm.reply("second", "two");
        submit(&mut h, "second").await;
        step(&mut h).await;

        let requests = h.llm.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(pairs(&requests[0]), vec![user("first")]);
        assert_eq!(
            pairs(&requests[1]),
            vec![user("first"), assistant("one"), user("second")]
        );
    }

    #[tokio::test]
    async fn test_transport_error_becomes_error_turn() {
        let mut h = harness();
        let gate = h.llm.gate("hi");

        submit(&mut h, "hi").await;
        gate.send(Err(LlmError::transport("Connection failed: refused")))
            .unwrap();
        step(&mut h).await;

        let expected = vec![user("hi"), assistant("Error: Connection failed: refused")];
        assert_eq!(pairs(h.interaction.session().history()), expected);
        assert_eq!(h.store.contents("default"), expected);
        assert_eq!(h.shown.turns(), expected);
        assert_eq!(h.interaction.state("default"), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_empty_response_becomes_error_turn() {
        let mut h = harness();
        let gate = h.llm.gate("hi");

        submit(&mut h, "hi").await;
        let err = LlmError::empty_response();
        assert_eq!(err.kind, LlmErrorKind::EmptyResponse);
        gate.send(Err(err)).unwrap();
        step(&mut h).await;

        let last = h.interaction.session().history().last().unwrap().clone();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_live_session() {
        let mut h = harness();
        h.store.set_fail_writes(true);
        h.llm.reply("hi", "Hello");

        submit(&mut h, "hi").await;
        step(&mut h).await;

        assert_eq!(
            pairs(h.interaction.session().history()),
            vec![user("hi"), assistant("Hello")]
        );
        assert!(h.store.contents("default").is_empty());
        assert_eq!(h.store.recorded_appends().len(), 2);
        assert_eq!(h.interaction.state("default"), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_blank_submission_is_ignored() {
        let mut h = harness();
        submit(&mut h, "   ").await;

        assert!(h.interaction.session().history().is_empty());
        assert!(h.store.recorded_appends().is_empty());
        assert_eq!(h.interaction.state("default"), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_list_conversations_marks_active() {
        let mut h = harness();
        h.store.append("zeta", Role::User, "z").await.unwrap();
        h.store.append("alpha", Role::User, "a").await.unwrap();

        h.interaction
            .handle_event(UserEvent::ListConversations)
            .await;

        assert_eq!(
            h.shown.last_notice().unwrap(),
            "Conversations:\n  alpha\n* default\n  zeta"
        );
    }

    #[tokio::test]
    async fn test_list_and_delete_messages() {
        let mut h = harness();
        h.llm.reply("hi", "Hello");
        submit(&mut h, "hi").await;
        step(&mut h).await;

        h.interaction.handle_event(UserEvent::ListMessages).await;
        assert_eq!(
            h.shown.last_notice().unwrap(),
            "Messages in conversation default:\n1 [user] hi\n2 [assistant] Hello"
        );

        h.interaction.handle_event(UserEvent::DeleteMessage(2)).await;
        assert_eq!(h.store.contents("default"), vec![user("hi")]);
        assert_eq!(pairs(h.interaction.session().history()), vec![user("hi")]);
        assert_eq!(h.shown.last_notice().unwrap(), "Deleted message 2.");

        h.interaction.handle_event(UserEvent::DeleteMessage(42)).await;
        assert!(h
            .shown
            .last_notice()
            .unwrap()
            .starts_with("Could not delete message 42"));
    }

    #[tokio::test]
    async fn test_delete_is_limited_to_active_conversation() {
        let mut h = harness();
        h.store.append("other", Role::User, "not yours").await.unwrap();
        h.store.append("default", Role::User, "mine").await.unwrap();

        h.interaction.handle_event(UserEvent::DeleteMessage(1)).await;

        assert_eq!(h.store.contents("other"), vec![user("not yours")]);
        assert_eq!(
            h.shown.last_notice().unwrap(),
            "Could not delete message 1: not in conversation default"
        );
    }

    #[tokio::test]
    async fn test_delete_reports_failed_reload() {
        let mut h = harness();
        h.store.append("default", Role::User, "one").await.unwrap();
        h.store.append("default", Role::User, "two").await.unwrap();
        h.store.fail_reads_after(1);

        h.interaction.handle_event(UserEvent::DeleteMessage(2)).await;

        assert_eq!(h.store.contents("default"), vec![user("one")]);
        let notice = h.shown.last_notice().unwrap();
        assert!(notice.starts_with("Could not load conversation default"), "{notice}");
        assert!(!h
            .shown
            .notices()
            .iter()
            .any(|n| n.starts_with("Deleted message")));
    }

    #[tokio::test]
    async fn test_store_update_rewrites_content() {
        let h = harness();
        let id = h.store.append("default", Role::User, "draft").await.unwrap();

        h.store.update(id, "final").await.unwrap();

        assert_eq!(h.store.contents("default"), vec![user("final")]);
        assert!(matches!(
            h.store.update(99, "x").await,
            Err(DbError::MessageNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_edit_is_not_supported() {
        let mut h = harness();
        h.store.append("default", Role::User, "keep me").await.unwrap();

        h.interaction.handle_event(UserEvent::EditMessage(1)).await;

        assert_eq!(h.store.contents("default"), vec![user("keep me")]);
        assert!(h.shown.last_notice().unwrap().contains("not supported"));
    }

    #[tokio::test]
    async fn test_quit_and_closed_input_stop_run() {
        let h = harness();
        let (tx, rx) = mpsc::channel(4);
        tx.send(UserEvent::Quit).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), h.interaction.run(rx))
            .await
            .expect("run should stop on quit");

        let h = harness();
        let (tx, rx) = mpsc::channel(4);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), h.interaction.run(rx))
            .await
            .expect("run should stop when input closes");
    }

    #[tokio::test]
    async fn test_run_reconciles_completions() {
        let h = harness();
        h.llm.reply("hi", "Hello");
        let store = h.store.clone();
        let shown = h.shown.clone();

        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(h.interaction.run(rx));
        tx.send(UserEvent::Submit("hi".to_string())).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.contents("default").len() < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(UserEvent::Quit).await.unwrap();
        handle.await.unwrap();

        assert_eq!(store.contents("default"), vec![user("hi"), assistant("Hello")]);
        assert_eq!(shown.turns(), vec![user("hi"), assistant("Hello")]);
    }

    #[tokio::test]
    async fn test_switch_round_trip_with_sqlite_store() {
        let db = Database::open_in_memory().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        let shown = RecordingPresentation::new();
        let mut interaction = InteractionLoop::new(
            ConversationSession::new(DatabaseStore::new(db)),
            llm.clone(),
            shown.clone(),
            "llama3.2",
        );

        llm.reply("hi", "Hello");
        interaction
            .handle_event(UserEvent::Submit("hi".to_string()))
            .await;
        let c = interaction.next_completion().await.unwrap();
        interaction.handle_completion(c).await;
        let before = pairs(interaction.session().history());

        interaction
            .handle_event(UserEvent::SwitchConversation("other".to_string()))
            .await;
        assert!(interaction.session().history().is_empty());
        interaction
            .handle_event(UserEvent::SwitchConversation("default".to_string()))
            .await;

        assert_eq!(pairs(interaction.session().history()), before);
        assert_eq!(shown.shown().last(), Some(&Shown::Turn(Role::Assistant, "Hello".to_string())));
    }
}
