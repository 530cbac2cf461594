//! View controller
//!
//! Switches between the sign-in and chat screens as session presence changes,
//! owns the room subscription while signed in, and asks the presenter to
//! scroll to the newest message whenever the tail of the sequence changes.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Identity, MessageId, RoomId};
use crate::sequence::MessageSequence;
use crate::session::{Login, Session};
use crate::stream::{MessageStream, StreamHandle};

/// The end-of-sequence marker could not be brought into view
#[derive(Debug, thiserror::Error)]
#[error("Scroll target unavailable")]
pub struct ScrollUnavailable;

/// Rendering surface for the chat client
pub trait Presenter: Send + Sync {
    fn show_sign_in(&self);

    fn show_chat(&self, identity: &Identity);

    /// Render the full ordered sequence, top to bottom
    fn render(&self, sequence: &MessageSequence);

    /// Bring the end-of-sequence marker into view
    fn scroll_to_end(&self) -> std::result::Result<(), ScrollUnavailable>;

    /// Report a failed user action, such as a refused sign-in or a send error
    fn show_error(&self, error: &Error);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Unauthenticated,
    Authenticated,
}

/// Tracks the last message seen so a scroll is only requested when it changes
#[derive(Debug, Default)]
struct AutoScroll {
    last: Option<MessageId>,
}

impl AutoScroll {
    fn observe(&mut self, sequence: &MessageSequence) -> bool {
        let last = sequence.last().map(|m| m.id.clone());
        if last == self.last {
            return false;
        }
        self.last = last;
        self.last.is_some()
    }
}

/// Subscription opened for one login
struct ActiveRoom {
    login: u64,
    handle: StreamHandle,
}

pub struct ViewController {
    stream: MessageStream,
    room: RoomId,
    presenter: Arc<dyn Presenter>,
    active: Option<ActiveRoom>,
}

impl ViewController {
    pub fn new(stream: MessageStream, room: RoomId, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            stream,
            room,
            presenter,
            active: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        if self.active.is_some() {
            ViewMode::Authenticated
        } else {
            ViewMode::Unauthenticated
        }
    }

    /// Sequence of the active subscription
    pub fn sequence(&self) -> Option<&MessageSequence> {
        self.active.as_ref().map(|a| a.handle.sequence())
    }

    /// Bring the view in line with the session's presence.
    ///
    /// A subscription belongs to the login it was opened for. Any other login,
    /// including a fresh sign-in by the same identity, tears it down and
    /// starts over with an empty sequence. On failure to subscribe the
    /// controller stays unauthenticated.
    pub async fn sync_presence(&mut self, session: &Session) -> Result<ViewMode> {
        let login = session.login();
        if let (Some(active), Some(login)) = (&self.active, &login) {
            if active.login == login.serial {
                return Ok(ViewMode::Authenticated);
            }
        }

        if self.leave() || login.is_none() {
            self.presenter.show_sign_in();
        }

        if let Some(login) = login {
            self.enter(session, login).await?;
        }
        Ok(self.mode())
    }

    async fn enter(&mut self, session: &Session, login: Login) -> Result<()> {
        let mut handle = self.stream.subscribe(session, &self.room).await?;
        let presenter = self.presenter.clone();
        let mut scroll = AutoScroll::default();
        handle.on_change(move |sequence| {
            presenter.render(sequence);
            if scroll.observe(sequence) {
                if let Err(e) = presenter.scroll_to_end() {
                    debug!(error = %e, "Scroll request ignored");
                }
            }
        });
        self.active = Some(ActiveRoom {
            login: login.serial,
            handle,
        });
        self.presenter.show_chat(&login.identity);
        info!(room = %self.room, user_id = %login.identity.id, "Entered chat");
        Ok(())
    }

    /// Release the active subscription, if any, and discard its sequence
    fn leave(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };
        self.stream.unsubscribe(&mut active.handle);
        info!(room = %self.room, "Left chat");
        true
    }

    /// Apply the next notification of the active subscription.
    ///
    /// Never resolves while unauthenticated. Returns `false` when the service
    /// ended the subscription, after which the controller is unauthenticated.
    pub async fn process_next(&mut self) -> bool {
        let Some(active) = self.active.as_mut() else {
            return std::future::pending().await;
        };

        if active.handle.pump().await {
            return true;
        }
        self.active = None;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Composer;
    use crate::log::LocalLog;
    use crate::models::{Ack, NewMessage, ProviderKind};
    use crate::sequence::{Change, Notification};
    use crate::service::{Feed, LogService, SubscriptionId};
    use crate::session::tests::FakeProvider;
    use crate::stream::tests::msg;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum Shown {
        SignIn,
        Chat(String),
        Render(Vec<String>),
        Scroll,
        Error(String),
    }

    #[derive(Default)]
    struct RecordingPresenter {
        events: Mutex<Vec<Shown>>,
        unmounted: bool,
    }

    impl RecordingPresenter {
        fn take(&self) -> Vec<Shown> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        fn scrolls(events: &[Shown]) -> usize {
            events.iter().filter(|e| **e == Shown::Scroll).count()
        }
    }

    impl Presenter for RecordingPresenter {
        fn show_sign_in(&self) {
            self.events.lock().unwrap().push(Shown::SignIn);
        }

        fn show_chat(&self, identity: &Identity) {
            self.events
                .lock()
                .unwrap()
                .push(Shown::Chat(identity.display_name.clone()));
        }

        fn render(&self, sequence: &MessageSequence) {
            let ids = sequence.iter().map(|m| m.id.to_string()).collect();
            self.events.lock().unwrap().push(Shown::Render(ids));
        }

        fn scroll_to_end(&self) -> std::result::Result<(), ScrollUnavailable> {
            if self.unmounted {
                return Err(ScrollUnavailable);
            }
            self.events.lock().unwrap().push(Shown::Scroll);
            Ok(())
        }

        fn show_error(&self, error: &Error) {
            self.events
                .lock()
                .unwrap()
                .push(Shown::Error(error.to_string()));
        }
    }

    /// Service driven by the test: notifications are pushed by hand and
    /// appends are acknowledged with scripted ids and timestamps.
    #[derive(Default)]
    struct ScriptedService {
        feeds: Mutex<Vec<mpsc::UnboundedSender<Notification>>>,
        acks: Mutex<Vec<Ack>>,
        released: Mutex<Vec<SubscriptionId>>,
    }

    impl ScriptedService {
        fn push(&self, notification: Notification) {
            for tx in self.feeds.lock().unwrap().iter() {
                let _ = tx.send(notification.clone());
            }
        }
    }

    #[async_trait]
    impl LogService for ScriptedService {
        async fn subscribe(&self, _room: &RoomId) -> Result<Feed> {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut feeds = self.feeds.lock().unwrap();
            feeds.push(tx);
            Ok(Feed {
                id: SubscriptionId(feeds.len() as u64),
                notifications: rx,
            })
        }

        fn unsubscribe(&self, subscription: SubscriptionId) {
            self.released.lock().unwrap().push(subscription);
            self.feeds.lock().unwrap().clear();
        }

        async fn append(&self, _room: &RoomId, _message: NewMessage) -> Result<Ack> {
            Ok(self.acks.lock().unwrap().remove(0))
        }
    }

    fn controller(
        service: Arc<dyn LogService>,
        presenter: Arc<RecordingPresenter>,
    ) -> ViewController {
        ViewController::new(
            MessageStream::new(service),
            RoomId::new("messages"),
            presenter,
        )
    }

    #[tokio::test]
    async fn test_sign_in_message_flow() {
        let service = Arc::new(ScriptedService::default());
        service.acks.lock().unwrap().push(Ack {
            id: MessageId::new("m2"),
            created_at: DateTime::from_timestamp(20, 0).unwrap(),
        });
        let presenter = Arc::new(RecordingPresenter::default());
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));
        let mut view = controller(service.clone(), presenter.clone());
        let mut composer = Composer::new(service.clone(), RoomId::new("messages"));

        session.sign_in(ProviderKind::Google).await.unwrap();
        assert_eq!(
            view.sync_presence(&session).await.unwrap(),
            ViewMode::Authenticated
        );
        assert_eq!(presenter.take(), vec![Shown::Chat("Ann".into())]);

        service.push(Notification::Diff(vec![Change::Added(msg("m1", 10, "hi"))]));
        assert!(view.process_next().await);
        assert_eq!(
            presenter.take(),
            vec![Shown::Render(vec!["m1".into()]), Shown::Scroll]
        );

        composer.set_draft("yo");
        composer.submit(&session).await.unwrap();
        assert_eq!(composer.draft(), "");
        // Nothing is shown until the service notifies
        assert!(presenter.take().is_empty());
        assert_eq!(view.sequence().unwrap().len(), 1);

        service.push(Notification::Diff(vec![Change::Added(msg("m2", 20, "yo"))]));
        assert!(view.process_next().await);
        assert_eq!(
            presenter.take(),
            vec![
                Shown::Render(vec!["m1".into(), "m2".into()]),
                Shown::Scroll
            ]
        );
    }

    #[tokio::test]
    async fn test_scroll_only_when_tail_changes() {
        let service = Arc::new(ScriptedService::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));
        let mut view = controller(service.clone(), presenter.clone());
        session.sign_in(ProviderKind::Google).await.unwrap();
        view.sync_presence(&session).await.unwrap();
        presenter.take();

        // Empty snapshot: nothing to scroll to
        service.push(Notification::Snapshot(vec![]));
        view.process_next().await;
        // Older message inserted before the tail, then tail arrives
        service.push(Notification::Diff(vec![Change::Added(msg("m5", 50, "e"))]));
        view.process_next().await;
        service.push(Notification::Diff(vec![Change::Added(msg("m1", 10, "a"))]));
        view.process_next().await;
        service.push(Notification::Diff(vec![Change::Modified(msg("m5", 50, "edited"))]));
        view.process_next().await;

        let events = presenter.take();
        assert_eq!(events.len(), 5);
        assert_eq!(RecordingPresenter::scrolls(&events), 1);
    }

    #[tokio::test]
    async fn test_scroll_failure_is_ignored() {
        let service = Arc::new(ScriptedService::default());
        let presenter = Arc::new(RecordingPresenter {
            unmounted: true,
            ..Default::default()
        });
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));
        let mut view = controller(service.clone(), presenter.clone());
        session.sign_in(ProviderKind::Google).await.unwrap();
        view.sync_presence(&session).await.unwrap();

        service.push(Notification::Diff(vec![Change::Added(msg("m1", 10, "hi"))]));
        assert!(view.process_next().await);
        assert_eq!(view.sequence().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_tears_down_subscription() {
        let service = Arc::new(ScriptedService::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));
        let mut view = controller(service.clone(), presenter.clone());

        assert_eq!(
            view.sync_presence(&session).await.unwrap(),
            ViewMode::Unauthenticated
        );
        session.sign_in(ProviderKind::Google).await.unwrap();
        view.sync_presence(&session).await.unwrap();
        // Same presence again is a no-op
        view.sync_presence(&session).await.unwrap();
        assert_eq!(service.feeds.lock().unwrap().len(), 1);

        session.sign_out().await;
        assert_eq!(
            view.sync_presence(&session).await.unwrap(),
            ViewMode::Unauthenticated
        );
        assert!(view.sequence().is_none());
        assert_eq!(*service.released.lock().unwrap(), vec![SubscriptionId(1)]);
        assert_eq!(
            presenter.take(),
            vec![Shown::SignIn, Shown::Chat("Ann".into()), Shown::SignIn]
        );
    }

    #[tokio::test]
    async fn test_sign_out_and_back_in_before_sync_starts_over() {
        let service = Arc::new(ScriptedService::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));
        let mut view = controller(service.clone(), presenter.clone());

        session.sign_in(ProviderKind::Google).await.unwrap();
        view.sync_presence(&session).await.unwrap();
        service.push(Notification::Diff(vec![Change::Added(msg("m1", 10, "hi"))]));
        assert!(view.process_next().await);
        presenter.take();

        // Both transitions land before the controller looks again
        session.sign_out().await;
        session.sign_in(ProviderKind::Google).await.unwrap();
        assert_eq!(
            view.sync_presence(&session).await.unwrap(),
            ViewMode::Authenticated
        );

        assert_eq!(service.released.lock().unwrap().len(), 1);
        assert_eq!(service.feeds.lock().unwrap().len(), 1);
        assert!(view.sequence().unwrap().is_empty());
        assert_eq!(
            presenter.take(),
            vec![Shown::SignIn, Shown::Chat("Ann".into())]
        );
    }

    #[tokio::test]
    async fn test_closed_feed_returns_to_unauthenticated() {
        let service = Arc::new(ScriptedService::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));
        let mut view = controller(service.clone(), presenter.clone());
        session.sign_in(ProviderKind::Google).await.unwrap();
        view.sync_presence(&session).await.unwrap();

        service.feeds.lock().unwrap().clear();
        assert!(!view.process_next().await);
        assert_eq!(view.mode(), ViewMode::Unauthenticated);
    }

    #[tokio::test]
    async fn test_local_log_end_to_end() {
        let log = Arc::new(LocalLog::new());
        let presenter = Arc::new(RecordingPresenter::default());
        let session = Session::new(Arc::new(FakeProvider::new("u1", "Ann")));
        let mut view = controller(log.clone(), presenter.clone());
        let mut composer = Composer::new(log.clone(), RoomId::new("messages"));

        session.sign_in(ProviderKind::Google).await.unwrap();
        view.sync_presence(&session).await.unwrap();
        assert!(view.process_next().await);

        composer.set_draft("first");
        composer.submit(&session).await.unwrap();
        assert!(view.process_next().await);

        let sequence = view.sequence().unwrap();
        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence.last().unwrap().text, "first");
    }
}
