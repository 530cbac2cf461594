//! Error types for roomchat core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The identity provider rejected the login or the user cancelled it
    #[error("Authentication failed ({code}): {message}")]
    Auth { code: String, message: String },

    /// A session-gated operation was attempted with nobody signed in
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The log service failed to subscribe or append
    #[error("Service error: {0}")]
    Service(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn auth(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Auth {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
