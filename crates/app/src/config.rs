//! Configuration file handling
//!
//! `roomchat.toml` lives in the platform config directory unless a path is
//! given explicitly. Every field has a default, so a missing file is fine.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use roomchat_core::{ProviderKind, DEFAULT_ROOM};
use roomchat_net::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE: &str = "roomchat.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Profile returned when signing in with a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log server address, `host:port`
    pub server: String,
    /// Room every client joins
    pub room: String,
    /// SQLite file used by `serve`; memory only when unset
    pub database: Option<PathBuf>,
    pub accounts: HashMap<ProviderKind, Account>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", DEFAULT_PORT),
            room: DEFAULT_ROOM.to_string(),
            database: None,
            accounts: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path, or from the default location if present
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    tracing::debug!(path = %path.display(), "No config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text)?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("dev", "roomchat", "roomchat").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join(CONFIG_FILE))
    }
}
