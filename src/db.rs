//! Database module
//!
//! Durable, append-ordered storage of conversation turns.

mod schema;

pub use schema::*;

use crate::llm::Role;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Message not found: {0}")]
    MessageNotFound(i64),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
///
/// All statements run on one connection behind a mutex, so writes for the
/// same conversation land in the order they were submitted.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init()?;
        Ok(db)
    }

    /// Create tables if they do not exist yet. Safe to call repeatedly.
    pub fn init(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Turn Operations ====================

    /// Append a turn and return its record id
    pub fn append(&self, conversation_id: &str, role: Role, content: &str) -> DbResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content) VALUES (?1, ?2, ?3)",
            params![conversation_id, role.as_str(), content],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All turns of a conversation in creation order
    pub fn list_turns(&self, conversation_id: &str) -> DbResult<Vec<TurnRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, timestamp
             FROM messages WHERE conversation_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id], parse_turn_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Distinct conversation ids, sorted
    pub fn list_conversation_ids(&self) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT conversation_id FROM messages ORDER BY conversation_id")?;

        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Look up one record by id
    #[allow(dead_code)] // Used in tests
    pub fn get_turn(&self, id: i64) -> DbResult<TurnRecord> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, conversation_id, role, content, timestamp
             FROM messages WHERE id = ?1",
            params![id],
            parse_turn_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::MessageNotFound(id),
            other => DbError::Sqlite(other),
        })
    }

    pub fn delete(&self, id: i64) -> DbResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::MessageNotFound(id));
        }
        Ok(())
    }

    /// Replace a record's content. Id, role and timestamp are left as they were.
    #[allow(dead_code)] // Used in tests
    pub fn update(&self, id: i64, content: &str) -> DbResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE messages SET content = ?1 WHERE id = ?2",
            params![content, id],
        )?;
        if updated == 0 {
            return Err(DbError::MessageNotFound(id));
        }
        Ok(())
    }
}

fn parse_turn_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TurnRecord> {
    let role_str: String = row.get(2)?;
    let role = role_str.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(TurnRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
    })
}

/// `CURRENT_TIMESTAMP` stores `YYYY-MM-DD HH:MM:SS` in UTC; RFC 3339 is
/// accepted too
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
}
