//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Not connected")]
    NotConnected,
}

impl From<Error> for roomchat_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Rejected(reason) => roomchat_core::Error::Service(reason),
            other => roomchat_core::Error::Service(other.to_string()),
        }
    }
}
