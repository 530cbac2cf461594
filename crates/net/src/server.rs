//! TCP server hosting a log service
//!
//! Each connection may hold any number of room subscriptions and issue
//! appends. Notifications from the hosted service are forwarded per
//! subscription; appends are answered in the order they were received.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use roomchat_core::{LogService, SubscriptionId};
use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Frame;

/// Log server handle
pub struct Server {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start serving the given log
    pub async fn start(addr: SocketAddr, log: Arc<dyn LogService>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Log server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(accept_loop(listener, log, shutdown_tx.clone()));

        Ok(Server {
            addr: bound_addr,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and tell connected clients to go away
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    log: Arc<dyn LogService>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            log.clone(),
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// A client subscription and the task forwarding its notifications
struct Forward {
    subscription: SubscriptionId,
    task: JoinHandle<()>,
}

/// Per-connection state
struct Connection {
    addr: SocketAddr,
    log: Arc<dyn LogService>,
    out_tx: mpsc::Sender<Frame>,
    forwards: HashMap<u64, Forward>,
}

impl Connection {
    async fn handle(&mut self, frame: Frame) {
        match frame {
            Frame::Subscribe { id, room } => match self.log.subscribe(&room).await {
                Ok(mut feed) => {
                    let _ = self.out_tx.send(Frame::Subscribed { id }).await;
                    let out_tx = self.out_tx.clone();
                    let task = tokio::spawn(async move {
                        while let Some(notification) = feed.notifications.recv().await {
                            for frame in Frame::for_notification(id, notification) {
                                if out_tx.send(frame).await.is_err() {
                                    return;
                                }
                            }
                        }
                    });
                    if let Some(old) = self.forwards.insert(
                        id,
                        Forward {
                            subscription: feed.id,
                            task,
                        },
                    ) {
                        self.release(old);
                    }
                    debug!(addr = %self.addr, id = id, room = %room, "Client subscribed");
                }
                Err(e) => {
                    warn!(addr = %self.addr, room = %room, error = %e, "Subscribe failed");
                    let _ = self
                        .out_tx
                        .send(Frame::Failed {
                            id,
                            reason: e.to_string(),
                        })
                        .await;
                }
            },
            Frame::Unsubscribe { id } => {
                if let Some(forward) = self.forwards.remove(&id) {
                    self.release(forward);
                    debug!(addr = %self.addr, id = id, "Client unsubscribed");
                }
            }
            Frame::Append { id, room, message } => {
                let reply = match self.log.append(&room, message).await {
                    Ok(ack) => Frame::Appended { id, ack },
                    Err(e) => {
                        warn!(addr = %self.addr, room = %room, error = %e, "Append failed");
                        Frame::Failed {
                            id,
                            reason: e.to_string(),
                        }
                    }
                };
                let _ = self.out_tx.send(reply).await;
            }
            _ => {
                debug!(addr = %self.addr, "Ignoring unexpected frame type");
            }
        }
    }

    fn release(&self, forward: Forward) {
        self.log.unsubscribe(forward.subscription);
        forward.task.abort();
    }

    fn close(&mut self) {
        for (_, forward) in std::mem::take(&mut self.forwards) {
            self.release(forward);
        }
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    log: Arc<dyn LogService>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, writer) = tokio::io::split(stream);
    let (out_tx, out_rx) = mpsc::channel(64);
    let mut writer_handle = tokio::spawn(writer_task(writer, out_rx));
    let mut writer_done = false;

    let mut conn = Connection {
        addr,
        log,
        out_tx,
        forwards: HashMap::new(),
    };

    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(frame) => conn.handle(frame).await,
                    Err(Error::ConnectionClosed) => {
                        debug!(addr = %addr, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(addr = %addr, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = &mut writer_handle => {
                warn!(addr = %addr, "Writer stopped, dropping connection");
                writer_done = true;
                break;
            }
            _ = shutdown_rx.recv() => {
                let _ = conn.out_tx.send(Frame::ServerShutdown).await;
                break;
            }
        }
    }

    conn.close();
    drop(conn);
    // Writer drains queued frames (such as the shutdown notice) then exits
    if !writer_done {
        let _ = writer_handle.await;
    }

    info!(addr = %addr, "Client disconnected");
}

/// Writer task - sends frames to the client
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            warn!(error = %e, "Write failed, closing connection");
            break;
        }
    }
}
