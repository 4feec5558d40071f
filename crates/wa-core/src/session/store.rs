//! Session persistence using SQLite

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::llm::ChatMessage;
use crate::session::{ChatSession, Sender};
use crate::{Error, Result};

/// SQLite-based session store, keyed by sender phone number
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Create a new session store with the given database path
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    /// Create an in-memory session store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    /// Initialize database tables
    fn init_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                phone_number TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                language TEXT,
                messages TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Save a session, overwriting any prior state for the same sender
    /// (last-writer-wins).
    pub fn save(&self, session: &ChatSession) -> Result<()> {
        let messages_json = serde_json::to_string(&session.messages)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO sessions
                (phone_number, id, sender_name, language, messages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.sender.phone_number,
                session.id,
                session.sender.display_name,
                session.language,
                messages_json,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load the session for a phone number
    pub fn load(&self, phone_number: &str) -> Result<Option<ChatSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT phone_number, id, sender_name, language, messages, created_at, updated_at
             FROM sessions WHERE phone_number = ?1",
        )?;

        let result = stmt.query_row(params![phone_number], |row| {
            let messages_json: String = row.get(4)?;
            let messages: Vec<ChatMessage> = serde_json::from_str(&messages_json)
                .map_err(|_| rusqlite::Error::InvalidQuery)?;

            let created_at_str: String = row.get(5)?;
            let updated_at_str: String = row.get(6)?;

            let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                .map_err(|_| rusqlite::Error::InvalidQuery)?
                .with_timezone(&Utc);

            let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
                .map_err(|_| rusqlite::Error::InvalidQuery)?
                .with_timezone(&Utc);

            Ok(ChatSession {
                id: row.get(1)?,
                sender: Sender {
                    phone_number: row.get(0)?,
                    display_name: row.get(2)?,
                },
                messages,
                language: row.get(3)?,
                created_at,
                updated_at,
            })
        });

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }

    /// Delete the session for a phone number
    pub fn delete(&self, phone_number: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sessions WHERE phone_number = ?1",
            params![phone_number],
        )?;
        Ok(())
    }

    /// Get stored session count
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> ChatSession {
        let mut session =
            ChatSession::new(Sender::new("+1234567890", Some("Alice")), "start template");
        session.add_message(ChatMessage::user("Hello"));
        session.add_message(ChatMessage::assistant("Hi Alice!"));
        session
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = SessionStore::in_memory().unwrap();
        let session = sample_session();

        store.save(&session).unwrap();
        let loaded = store.load("+1234567890").unwrap().unwrap();

        assert_eq!(loaded, session);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let store = SessionStore::in_memory().unwrap();
        assert!(store.load("+9999999999").unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_prior_state() {
        let store = SessionStore::in_memory().unwrap();
        let mut session = sample_session();
        store.save(&session).unwrap();

        session.add_message(ChatMessage::user("Another one"));
        store.save(&session).unwrap();

        let loaded = store.load("+1234567890").unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 4);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let store = SessionStore::in_memory().unwrap();
        store.save(&sample_session()).unwrap();
        store.delete("+1234567890").unwrap();
        assert!(store.load("+1234567890").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }
}
