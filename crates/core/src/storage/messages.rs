//! Message storage operations

use rusqlite::{params, Connection};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::models::{Message, MessageId, RoomId};

use super::parse::parse_micros;

pub struct MessageStore<'a> {
    conn: &'a Connection,
}

impl<'a> MessageStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert an accepted message. Pending messages cannot be stored.
    #[instrument(skip(self, room, message), fields(room = %room, message_id = %message.id))]
    pub fn create(&self, room: &RoomId, message: &Message) -> Result<()> {
        let created_at = message
            .created_at
            .timestamp()
            .ok_or_else(|| Error::Service("cannot store a message without a timestamp".into()))?;

        self.conn.execute(
            "INSERT INTO messages (id, room, author_id, author_display_name, created_at_us, text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.as_str(),
                room.as_str(),
                message.author_id,
                message.author_display_name,
                created_at.timestamp_micros(),
                message.text,
            ],
        )?;
        Ok(())
    }

    /// All messages of a room, oldest first
    pub fn list_for_room(&self, room: &RoomId) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, author_id, author_display_name, created_at_us, text
             FROM messages WHERE room = ?1
             ORDER BY created_at_us, id",
        )?;

        let messages = stmt
            .query_map(params![room.as_str()], |row| {
                Ok(Message {
                    id: MessageId::new(row.get::<_, String>(0)?),
                    author_id: row.get(1)?,
                    author_display_name: row.get(2)?,
                    created_at: parse_micros(3, row.get(3)?)?.into(),
                    text: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }
}
