//! In-process log service
//!
//! [`LocalLog`] keeps each room's messages in memory, assigns ids and strictly
//! increasing timestamps on append, and fans the accepted message out to every
//! live subscriber as an `added` diff. A new subscriber first receives a
//! snapshot of the room. When opened with a [`Database`] the log is persisted
//! and reloaded per room on first use.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::invariants::assert_monotonic;
use crate::models::{Ack, Message, MessageId, NewMessage, RoomId};
use crate::sequence::{Change, Notification};
use crate::service::{Feed, LogService, SubscriptionId};
use crate::storage::Database;

#[derive(Default)]
struct Room {
    messages: Vec<Message>,
    subscribers: HashMap<SubscriptionId, mpsc::UnboundedSender<Notification>>,
    /// Last assigned timestamp, in microseconds
    last_micros: Option<i64>,
}

impl Room {
    fn from_history(messages: Vec<Message>) -> Self {
        let last_micros = messages
            .iter()
            .filter_map(|m| m.created_at.timestamp())
            .map(|ts| ts.timestamp_micros())
            .max();
        Self {
            messages,
            subscribers: HashMap::new(),
            last_micros,
        }
    }

    /// Timestamp for the next append. Not taken until [`Room::commit`].
    fn next_timestamp(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let now = now.timestamp_micros();
        let assigned = match self.last_micros {
            Some(last) if last >= now => last + 1,
            _ => now,
        };
        assert_monotonic(self.last_micros, assigned);
        DateTime::from_timestamp_micros(assigned)
            .ok_or_else(|| Error::Service("timestamp out of range".into()))
    }

    /// Record an accepted message and fan it out
    fn commit(&mut self, message: Message) {
        if let Some(ts) = message.created_at.timestamp() {
            self.last_micros = Some(ts.timestamp_micros());
        }
        self.messages.push(message.clone());
        self.broadcast(&Notification::Diff(vec![Change::Added(message)]));
    }

    fn broadcast(&mut self, notification: &Notification) {
        self.subscribers.retain(|id, tx| {
            let alive = tx.send(notification.clone()).is_ok();
            if !alive {
                debug!(subscription = %id, "Dropping closed subscriber");
            }
            alive
        });
    }
}

#[derive(Default)]
struct LogState {
    rooms: HashMap<RoomId, Room>,
    subscriptions: HashMap<SubscriptionId, RoomId>,
    next_subscription: u64,
}

/// Log service backed by process memory and optionally SQLite
#[derive(Default)]
pub struct LocalLog {
    state: Mutex<LogState>,
    store: Option<Mutex<Database>>,
}

impl LocalLog {
    /// Memory-only log
    pub fn new() -> Self {
        Self::default()
    }

    /// Log persisted to the given database
    pub fn with_database(db: Database) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            store: Some(Mutex::new(db)),
        }
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn room<'s>(&self, state: &'s mut LogState, room: &RoomId) -> Result<&'s mut Room> {
        if !state.rooms.contains_key(room) {
            let loaded = match &self.store {
                Some(store) => {
                    let db = store.lock().unwrap_or_else(PoisonError::into_inner);
                    let history = db.messages().list_for_room(room)?;
                    info!(room = %room, count = history.len(), "Loaded room history");
                    Room::from_history(history)
                }
                None => Room::default(),
            };
            state.rooms.insert(room.clone(), loaded);
        }
        state
            .rooms
            .get_mut(room)
            .ok_or_else(|| Error::Service(format!("room {} unavailable", room)))
    }

    /// Number of live subscriptions on a room
    pub fn subscriber_count(&self, room: &RoomId) -> usize {
        self.state()
            .rooms
            .get(room)
            .map_or(0, |r| r.subscribers.len())
    }

    /// Number of messages currently held for a room
    pub fn message_count(&self, room: &RoomId) -> usize {
        self.state().rooms.get(room).map_or(0, |r| r.messages.len())
    }
}

#[async_trait]
impl LogService for LocalLog {
    async fn subscribe(&self, room: &RoomId) -> Result<Feed> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();

        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;

        let entry = self.room(&mut state, room)?;
        // Receiver is held locally, so this cannot fail
        let _ = tx.send(Notification::Snapshot(entry.messages.clone()));
        entry.subscribers.insert(id, tx);
        state.subscriptions.insert(id, room.clone());

        debug!(room = %room, subscription = %id, "Subscriber added");
        Ok(Feed {
            id,
            notifications: rx,
        })
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut state = self.state();
        let Some(room) = state.subscriptions.remove(&subscription) else {
            return;
        };
        if let Some(entry) = state.rooms.get_mut(&room) {
            entry.subscribers.remove(&subscription);
        }
        debug!(room = %room, subscription = %subscription, "Subscriber removed");
    }

    async fn append(&self, room: &RoomId, message: NewMessage) -> Result<Ack> {
        let mut state = self.state();
        let entry = self.room(&mut state, room)?;

        let created_at = entry.next_timestamp(Utc::now())?;
        let message = message.into_message(MessageId::generate(), created_at);

        if let Some(store) = &self.store {
            let db = store.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = db.messages().create(room, &message) {
                warn!(room = %room, error = %e, "Failed to persist message");
                return Err(Error::Service(format!("failed to persist message: {}", e)));
            }
        }

        let ack = Ack {
            id: message.id.clone(),
            created_at,
        };
        entry.commit(message);

        debug!(room = %room, message_id = %ack.id, "Message appended");
        Ok(ack)
    }
}
