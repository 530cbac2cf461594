//! Roomchat Network Library
//!
//! Serves a room log over TCP and connects to one as a [`roomchat_core::LogService`].
//!
//! # Architecture
//!
//! - **Server**: hosts a log service and accepts any number of clients
//! - **Client**: one connection multiplexing subscriptions and appends
//! - **Protocol**: length-prefixed JSON frames
//!
//! # Usage
//!
//! ```ignore
//! // Host the log
//! let server = Server::start(addr, Arc::new(LocalLog::new())).await?;
//!
//! // Use it remotely like any other log service
//! let client = Arc::new(Client::connect(server.addr()).await?);
//! let stream = MessageStream::new(client.clone());
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use client::{Client, ConnectionState};
pub use error::{Error, Result};
pub use frame::MAX_FRAME_SIZE;
pub use protocol::Frame;
pub use server::Server;

/// Default port for roomchat log servers
pub const DEFAULT_PORT: u16 = 7331;
