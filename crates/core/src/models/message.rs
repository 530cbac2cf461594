//! Message model for the shared room log

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of a room on the log service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service-assigned message id. Never generated by a client.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh id. Only log service implementations call this.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creation time of a message as seen by the service.
///
/// `Pending` marks an entry whose server timestamp has not resolved yet.
/// Variant order matters: every assigned timestamp sorts before `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedAt {
    Assigned(DateTime<Utc>),
    Pending,
}

impl CreatedAt {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            CreatedAt::Assigned(ts) => Some(*ts),
            CreatedAt::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CreatedAt::Pending)
    }
}

impl From<DateTime<Utc>> for CreatedAt {
    fn from(ts: DateTime<Utc>) -> Self {
        CreatedAt::Assigned(ts)
    }
}

/// A chat message in the room log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author_id: String,
    pub author_display_name: String,
    pub created_at: CreatedAt,
    pub text: String,
}

impl Message {
    /// Display order key: creation time, then id for ties
    pub fn order_key(&self) -> (CreatedAt, &MessageId) {
        (self.created_at, &self.id)
    }

    pub fn format_timestamp(&self) -> String {
        match self.created_at {
            CreatedAt::Assigned(ts) => ts
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            CreatedAt::Pending => "sending...".to_string(),
        }
    }
}

/// Append request. The service fills in `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub author_id: String,
    pub author_display_name: String,
    pub text: String,
}

impl NewMessage {
    pub fn into_message(self, id: MessageId, created_at: DateTime<Utc>) -> Message {
        Message {
            id,
            author_id: self.author_id,
            author_display_name: self.author_display_name,
            created_at: CreatedAt::Assigned(created_at),
            text: self.text,
        }
    }
}

/// Acknowledgement of an accepted append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> CreatedAt {
        CreatedAt::Assigned(DateTime::from_timestamp(secs, 0).unwrap())
    }

    #[test]
    fn test_pending_sorts_last() {
        assert!(at(10) < at(20));
        assert!(at(i32::MAX as i64) < CreatedAt::Pending);
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(MessageId::generate(), MessageId::generate());
    }

    #[test]
    fn test_pending_timestamp_label() {
        let msg = Message {
            id: MessageId::new("m1"),
            author_id: "u1".into(),
            author_display_name: "Ann".into(),
            created_at: CreatedAt::Pending,
            text: "hi".into(),
        };
        assert_eq!(msg.format_timestamp(), "sending...");
        assert!(msg.created_at.timestamp().is_none());
    }
}
