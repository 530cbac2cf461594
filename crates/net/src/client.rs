//! TCP client for a remote log service
//!
//! [`Client`] owns one connection and multiplexes every subscription and
//! append over it. It implements [`LogService`], so the chat core can run
//! against a remote server exactly as it runs against a [`roomchat_core::LocalLog`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roomchat_core::{
    Ack, Feed, LogService, Message, NewMessage, Notification, RoomId, SubscriptionId,
};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Frame;

/// How long a subscribe or append waits for the server's reply
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

enum ClientCommand {
    Subscribe {
        id: u64,
        room: RoomId,
        feed: mpsc::UnboundedSender<Notification>,
        reply: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        id: u64,
    },
    Append {
        id: u64,
        room: RoomId,
        message: NewMessage,
        reply: oneshot::Sender<Result<Ack>>,
    },
    Disconnect,
}

/// Requests waiting on the server, keyed by request id
#[derive(Default)]
struct InFlight {
    subscribes: HashMap<u64, oneshot::Sender<Result<()>>>,
    appends: HashMap<u64, oneshot::Sender<Result<Ack>>>,
    feeds: HashMap<u64, mpsc::UnboundedSender<Notification>>,
    /// Snapshot chunks received so far, per subscription
    partial: HashMap<u64, Vec<Message>>,
}

impl InFlight {
    /// Hand a notification to its feed. Returns the id back if the local feed
    /// has gone away and the server should be told to stop.
    fn deliver(&mut self, id: u64, notification: Notification) -> Option<u64> {
        let delivered = self
            .feeds
            .get(&id)
            .map(|feed| feed.send(notification).is_ok());
        match delivered {
            Some(true) => None,
            Some(false) => {
                debug!(id = id, "Feed dropped, releasing subscription");
                self.release(id);
                Some(id)
            }
            None => {
                debug!(id = id, "Notification for released subscription");
                None
            }
        }
    }

    fn release(&mut self, id: u64) -> bool {
        self.partial.remove(&id);
        self.feeds.remove(&id).is_some()
    }
}

/// Client handle for a remote log service
pub struct Client {
    addr: SocketAddr,
    state: Arc<RwLock<ConnectionState>>,
    cmd_tx: mpsc::UnboundedSender<ClientCommand>,
    next_id: AtomicU64,
}

impl Client {
    /// Connect to a log server
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(addr = %addr, "Connecting to log server");

        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = tokio::io::split(stream);

        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::channel(64);

        tokio::spawn(reader_task(reader, frame_tx));
        tokio::spawn(connection_task(writer, state.clone(), frame_rx, cmd_rx));

        Ok(Client {
            addr,
            state,
            cmd_tx,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Close the connection. Open feeds end and pending requests fail.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect);
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, cmd: ClientCommand) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| Error::NotConnected)
    }

    async fn await_reply<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl LogService for Client {
    async fn subscribe(&self, room: &RoomId) -> roomchat_core::Result<Feed> {
        let id = self.next_id();
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let (reply, rx) = oneshot::channel();

        self.send(ClientCommand::Subscribe {
            id,
            room: room.clone(),
            feed: feed_tx,
            reply,
        })?;
        Self::await_reply(rx).await?;

        Ok(Feed {
            id: SubscriptionId(id),
            notifications: feed_rx,
        })
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        if self
            .send(ClientCommand::Unsubscribe {
                id: subscription.0,
            })
            .is_err()
        {
            debug!(subscription = %subscription, "Unsubscribe after disconnect");
        }
    }

    async fn append(&self, room: &RoomId, message: NewMessage) -> roomchat_core::Result<Ack> {
        let id = self.next_id();
        let (reply, rx) = oneshot::channel();

        self.send(ClientCommand::Append {
            id,
            room: room.clone(),
            message,
            reply,
        })?;
        Ok(Self::await_reply(rx).await?)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Forward incoming frames so the connection task can select on them safely
async fn reader_task(mut reader: ReadHalf<TcpStream>, frame_tx: mpsc::Sender<Frame>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(frame) => {
                if frame_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(Error::ConnectionClosed) => {
                debug!("Server closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Read error");
                break;
            }
        }
    }
}

/// Main connection task
async fn connection_task(
    mut writer: WriteHalf<TcpStream>,
    state: Arc<RwLock<ConnectionState>>,
    mut frame_rx: mpsc::Receiver<Frame>,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientCommand>,
) {
    let mut in_flight = InFlight::default();

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                match frame {
                    Some(Frame::ServerShutdown) => {
                        info!("Server is shutting down");
                        break;
                    }
                    Some(frame) => {
                        if let Some(stale) = handle_server_frame(frame, &mut in_flight) {
                            if let Err(e) = write_frame(&mut writer, &Frame::Unsubscribe { id: stale }).await {
                                warn!(error = %e, "Write error");
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }

            cmd = cmd_rx.recv() => {
                let frame = match cmd {
                    Some(ClientCommand::Subscribe { id, room, feed, reply }) => {
                        in_flight.subscribes.insert(id, reply);
                        in_flight.feeds.insert(id, feed);
                        Frame::Subscribe { id, room }
                    }
                    Some(ClientCommand::Unsubscribe { id }) => {
                        if !in_flight.release(id) {
                            continue;
                        }
                        Frame::Unsubscribe { id }
                    }
                    Some(ClientCommand::Append { id, room, message, reply }) => {
                        in_flight.appends.insert(id, reply);
                        Frame::Append { id, room, message }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                };

                if let Err(e) = write_frame(&mut writer, &frame).await {
                    warn!(error = %e, "Write error");
                    break;
                }
            }
        }
    }

    // Dropping in-flight replies and feeds fails waiting requests and ends feeds
    drop(in_flight);
    *state.write().await = ConnectionState::Disconnected;
    info!("Disconnected from log server");
}

/// Route a server frame to its waiting request or feed.
///
/// Returns the id of a subscription whose local feed has gone away, so the
/// server can be told to stop sending it.
fn handle_server_frame(frame: Frame, in_flight: &mut InFlight) -> Option<u64> {
    match frame {
        Frame::Subscribed { id } => {
            if let Some(reply) = in_flight.subscribes.remove(&id) {
                let _ = reply.send(Ok(()));
            }
        }
        Frame::SnapshotChunk { id, messages, done } => {
            if !in_flight.feeds.contains_key(&id) {
                debug!(id = id, "Snapshot chunk for released subscription");
                return None;
            }
            let buffered = in_flight.partial.entry(id).or_default();
            buffered.extend(messages);
            if done {
                let messages = in_flight.partial.remove(&id).unwrap_or_default();
                return in_flight.deliver(id, Notification::Snapshot(messages));
            }
        }
        Frame::Notify { id, notification } => return in_flight.deliver(id, notification),
        Frame::Appended { id, ack } => {
            if let Some(reply) = in_flight.appends.remove(&id) {
                let _ = reply.send(Ok(ack));
            }
        }
        Frame::Failed { id, reason } => {
            warn!(id = id, reason = %reason, "Request rejected by server");
            if let Some(reply) = in_flight.appends.remove(&id) {
                let _ = reply.send(Err(Error::Rejected(reason)));
            } else if let Some(reply) = in_flight.subscribes.remove(&id) {
                in_flight.release(id);
                let _ = reply.send(Err(Error::Rejected(reason)));
            }
        }
        _ => {
            debug!("Ignoring unexpected frame");
        }
    }
    None
}
