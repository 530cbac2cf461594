//! SQLite storage layer for the room log

mod messages;
mod parse;
mod schema;

use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;

use crate::error::Result;

pub use messages::MessageStore;
pub use schema::SCHEMA_VERSION;

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        schema::create_tables(&self.conn)
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap_or(0)
    }

    pub fn messages(&self) -> MessageStore<'_> {
        MessageStore::new(&self.conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreatedAt, Message, MessageId, RoomId};
    use chrono::DateTime;

    fn msg(id: &str, micros: i64) -> Message {
        Message {
            id: MessageId::new(id),
            author_id: "u1".into(),
            author_display_name: "Ann".into(),
            created_at: DateTime::from_timestamp_micros(micros).unwrap().into(),
            text: format!("text {}", id),
        }
    }

    #[test]
    fn test_schema_version() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version(), SCHEMA_VERSION);
    }

    #[test]
    fn test_messages_listed_in_order_per_room() {
        let db = Database::open_in_memory().unwrap();
        let room = RoomId::new("messages");
        let other = RoomId::new("elsewhere");

        db.messages().create(&room, &msg("b", 20)).unwrap();
        db.messages().create(&room, &msg("c", 10)).unwrap();
        db.messages().create(&room, &msg("a", 20)).unwrap();
        db.messages().create(&other, &msg("x", 5)).unwrap();

        let listed = db.messages().list_for_room(&room).unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(listed[0], msg("c", 10));
        assert_eq!(db.messages().list_for_room(&other).unwrap().len(), 1);
    }

    #[test]
    fn test_pending_message_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut pending = msg("p", 1);
        pending.created_at = CreatedAt::Pending;
        assert!(db.messages().create(&RoomId::new("r"), &pending).is_err());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        let room = RoomId::new("messages");

        {
            let db = Database::open(&path).unwrap();
            db.messages().create(&room, &msg("m1", 42)).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.messages().list_for_room(&room).unwrap(), vec![msg("m1", 42)]);
    }
}
