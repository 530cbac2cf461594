//! Live message stream for one room
//!
//! [`MessageStream::subscribe`] opens a service subscription and returns a
//! [`StreamHandle`] that owns the room's [`MessageSequence`]. Every
//! notification pumped through the handle is folded into the sequence and the
//! full recomputed sequence is handed to each registered listener, one call
//! per notification, in arrival order.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::RoomId;
use crate::sequence::{MessageSequence, Notification};
use crate::service::{Feed, LogService, SubscriptionId};
use crate::session::Session;

/// Callback invoked with the recomputed sequence after each notification
pub type Listener = Box<dyn FnMut(&MessageSequence) + Send>;

/// Returned by [`StreamHandle::on_change`] to remove the listener later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub struct MessageStream {
    service: Arc<dyn LogService>,
}

impl MessageStream {
    pub fn new(service: Arc<dyn LogService>) -> Self {
        Self { service }
    }

    /// Subscribe to a room. Requires a signed-in session.
    pub async fn subscribe(&self, session: &Session, room: &RoomId) -> Result<StreamHandle> {
        if !session.is_present() {
            warn!(room = %room, "Subscribe attempted without a session");
            return Err(Error::NotAuthenticated);
        }

        let feed = self.service.subscribe(room).await?;
        info!(room = %room, subscription = %feed.id, "Subscribed to room");

        Ok(StreamHandle {
            room: room.clone(),
            service: self.service.clone(),
            feed: Some(feed),
            sequence: MessageSequence::new(),
            listeners: Vec::new(),
            next_listener: 0,
        })
    }

    /// Release a handle's subscription. Safe to call more than once.
    pub fn unsubscribe(&self, handle: &mut StreamHandle) {
        handle.unsubscribe();
    }
}

pub struct StreamHandle {
    room: RoomId,
    service: Arc<dyn LogService>,
    feed: Option<Feed>,
    sequence: MessageSequence,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl StreamHandle {
    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.feed.as_ref().map(|f| f.id)
    }

    pub fn is_active(&self) -> bool {
        self.feed.is_some()
    }

    /// Current sequence, read-only
    pub fn sequence(&self) -> &MessageSequence {
        &self.sequence
    }

    /// Register a change listener
    pub fn on_change<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&MessageSequence) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Wait for the next notification and apply it.
    ///
    /// Returns `false` once the subscription has been released or the service
    /// closed the feed.
    pub async fn pump(&mut self) -> bool {
        let Some(feed) = self.feed.as_mut() else {
            return false;
        };

        match feed.notifications.recv().await {
            Some(notification) => {
                self.apply(notification);
                true
            }
            None => {
                warn!(room = %self.room, "Log service closed the subscription");
                self.release();
                false
            }
        }
    }

    /// Fold a notification and emit the recomputed sequence.
    ///
    /// Ignored once unsubscribed.
    pub fn apply(&mut self, notification: Notification) {
        if self.feed.is_none() {
            debug!(room = %self.room, "Dropping notification after unsubscribe");
            return;
        }

        self.sequence.apply(notification);
        debug!(room = %self.room, len = self.sequence.len(), "Sequence updated");

        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.sequence);
        }
    }

    /// Release the service subscription and stop all callbacks
    pub fn unsubscribe(&mut self) {
        if self.feed.is_some() {
            self.release();
            info!(room = %self.room, "Unsubscribed from room");
        }
        self.listeners.clear();
    }

    fn release(&mut self) {
        if let Some(feed) = self.feed.take() {
            self.service.unsubscribe(feed.id);
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::log::LocalLog;
    use crate::models::{CreatedAt, Message, MessageId, NewMessage, ProviderKind};
    use crate::sequence::Change;
    use crate::session::tests::FakeProvider;
    use chrono::DateTime;
    use std::sync::Mutex;

    pub(crate) fn msg(id: &str, secs: i64, text: &str) -> Message {
        Message {
            id: MessageId::new(id),
            author_id: "u1".into(),
            author_display_name: "Ann".into(),
            created_at: CreatedAt::Assigned(DateTime::from_timestamp(secs, 0).unwrap()),
            text: text.into(),
        }
    }

    async fn signed_in() -> Session {
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));
        session.sign_in(ProviderKind::Google).await.unwrap();
        session
    }

    fn recorder(handle: &mut StreamHandle) -> Arc<Mutex<Vec<Vec<String>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        handle.on_change(move |seq| {
            let ids = seq.iter().map(|m| m.id.to_string()).collect();
            sink.lock().unwrap().push(ids);
        });
        seen
    }

    #[tokio::test]
    async fn test_subscribe_requires_session() {
        let log = Arc::new(LocalLog::new());
        let stream = MessageStream::new(log.clone());
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));

        let result = stream.subscribe(&session, &RoomId::new("messages")).await;
        assert!(matches!(result, Err(Error::NotAuthenticated)));
        assert_eq!(log.subscriber_count(&RoomId::new("messages")), 0);
    }

    #[tokio::test]
    async fn test_one_emission_per_notification() {
        let session = signed_in().await;
        let stream = MessageStream::new(Arc::new(LocalLog::new()));
        let mut handle = stream
            .subscribe(&session, &RoomId::new("messages"))
            .await
            .unwrap();
        let seen = recorder(&mut handle);

        handle.apply(Notification::Diff(vec![Change::Added(msg("m2", 20, "b"))]));
        handle.apply(Notification::Diff(vec![
            Change::Added(msg("m1", 10, "a")),
            Change::Added(msg("m3", 30, "c")),
        ]));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], vec!["m2"]);
        assert_eq!(seen[1], vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let session = signed_in().await;
        let log = Arc::new(LocalLog::new());
        let room = RoomId::new("messages");
        let stream = MessageStream::new(log.clone());
        let mut handle = stream.subscribe(&session, &room).await.unwrap();
        let seen = recorder(&mut handle);
        assert_eq!(log.subscriber_count(&room), 1);

        stream.unsubscribe(&mut handle);
        stream.unsubscribe(&mut handle);
        assert_eq!(log.subscriber_count(&room), 0);
        assert!(!handle.is_active());

        log.append(
            &room,
            NewMessage {
                author_id: "u1".into(),
                author_display_name: "Ann".into(),
                text: "late".into(),
            },
        )
        .await
        .unwrap();
        handle.apply(Notification::Snapshot(vec![msg("m1", 1, "x")]));

        assert!(!handle.pump().await);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pump_delivers_snapshot_then_appends() {
        let session = signed_in().await;
        let log = Arc::new(LocalLog::new());
        let room = RoomId::new("messages");
        let stream = MessageStream::new(log.clone());
        let mut handle = stream.subscribe(&session, &room).await.unwrap();
        let seen = recorder(&mut handle);

        let ack = log
            .append(
                &room,
                NewMessage {
                    author_id: "u1".into(),
                    author_display_name: "Ann".into(),
                    text: "hi".into(),
                },
            )
            .await
            .unwrap();

        assert!(handle.pump().await);
        assert!(handle.pump().await);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_empty());
        assert_eq!(seen[1], vec![ack.id.to_string()]);
        assert_eq!(handle.sequence().last().unwrap().text, "hi");
    }

    #[tokio::test]
    async fn test_removed_listener_is_not_called() {
        let session = signed_in().await;
        let stream = MessageStream::new(Arc::new(LocalLog::new()));
        let mut handle = stream
            .subscribe(&session, &RoomId::new("messages"))
            .await
            .unwrap();

        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let id = handle.on_change(move |_| *counter.lock().unwrap() += 1);

        handle.apply(Notification::Snapshot(vec![]));
        assert!(handle.remove_listener(id));
        assert!(!handle.remove_listener(id));
        handle.apply(Notification::Snapshot(vec![]));

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
