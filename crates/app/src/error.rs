//! Application error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Core(#[from] roomchat_core::Error),

    #[error("Network error: {0}")]
    Net(#[from] roomchat_net::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve server address: {0}")]
    Resolve(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
