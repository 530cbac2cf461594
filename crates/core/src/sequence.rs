//! Ordered materialized view of a room log
//!
//! The log service pushes either full snapshots or diffs. Both fold into a
//! [`MessageSequence`] that stays sorted by `(created_at, id)` with no
//! duplicate ids, whatever order the notifications arrive in.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::invariants::assert_sequence_invariants;
use crate::models::{Message, MessageId};

/// A single change inside a diff notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    Added(Message),
    Modified(Message),
    Removed { id: MessageId },
}

/// A change pushed by the log service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// Full contents of the room
    Snapshot(Vec<Message>),
    /// Incremental changes since the previous notification
    Diff(Vec<Change>),
}

/// Messages of one room in display order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSequence {
    messages: Vec<Message>,
}

impl MessageSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Fold a notification into the sequence
    pub fn apply(&mut self, notification: Notification) {
        match notification {
            Notification::Snapshot(messages) => self.replace(messages),
            Notification::Diff(changes) => {
                for change in changes {
                    match change {
                        Change::Added(message) | Change::Modified(message) => self.upsert(message),
                        Change::Removed { id } => {
                            self.remove(&id);
                        }
                    }
                }
            }
        }
        assert_sequence_invariants(&self.messages);
    }

    fn replace(&mut self, messages: Vec<Message>) {
        // Later entries win when a snapshot repeats an id
        let mut seen = HashSet::with_capacity(messages.len());
        let mut unique: Vec<Message> = messages
            .into_iter()
            .rev()
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        unique.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        self.messages = unique;
    }

    fn upsert(&mut self, message: Message) {
        self.remove(&message.id);
        let pos = self
            .messages
            .partition_point(|m| m.order_key() < message.order_key());
        self.messages.insert(pos, message);
    }

    fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let pos = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(pos))
    }
}

impl<'a> IntoIterator for &'a MessageSequence {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
