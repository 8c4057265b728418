//! Persistence seam for the conversation session
//!
//! The session only depends on this trait, so tests can swap in an
//! in-memory or failing store.

use crate::db::{Database, DbResult, TurnRecord};
use crate::llm::Role;
use async_trait::async_trait;
use std::sync::Arc;

/// Durable append/query of turns keyed by conversation id
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Append a turn; the record is durable once this returns
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> DbResult<i64>;

    /// Turns of one conversation in creation order
    async fn list_turns(&self, conversation_id: &str) -> DbResult<Vec<TurnRecord>>;

    /// Known conversation ids, sorted
    async fn list_conversation_ids(&self) -> DbResult<Vec<String>>;

    async fn delete(&self, id: i64) -> DbResult<()>;

    #[allow(dead_code)] // Used in tests
    async fn update(&self, id: i64, content: &str) -> DbResult<()>;
}

#[async_trait]
impl<T: TurnStore + ?Sized> TurnStore for Arc<T> {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> DbResult<i64> {
        (**self).append(conversation_id, role, content).await
    }

    async fn list_turns(&self, conversation_id: &str) -> DbResult<Vec<TurnRecord>> {
        (**self).list_turns(conversation_id).await
    }

    async fn list_conversation_ids(&self) -> DbResult<Vec<String>> {
        (**self).list_conversation_ids().await
    }

    async fn delete(&self, id: i64) -> DbResult<()> {
        (**self).delete(id).await
    }

    async fn update(&self, id: i64, content: &str) -> DbResult<()> {
        (**self).update(id, content).await
    }
}

/// Production store backed by the `SQLite` database
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn inner(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl TurnStore for DatabaseStore {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> DbResult<i64> {
        self.db.append(conversation_id, role, content)
    }

    async fn list_turns(&self, conversation_id: &str) -> DbResult<Vec<TurnRecord>> {
        self.db.list_turns(conversation_id)
    }

    async fn list_conversation_ids(&self) -> DbResult<Vec<String>> {
        self.db.list_conversation_ids()
    }

    async fn delete(&self, id: i64) -> DbResult<()> {
        self.db.delete(id)
    }

    async fn update(&self, id: i64, content: &str) -> DbResult<()> {
        self.db.update(id, content)
    }
}
