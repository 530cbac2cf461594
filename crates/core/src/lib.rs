//! Roomchat Core Library
//!
//! Session, ordered message stream, composer and view controller for a
//! single-room live chat client, plus an in-process log service.

pub mod composer;
pub mod error;
pub mod invariants;
pub mod log;
pub mod models;
pub mod sequence;
pub mod service;
pub mod session;
pub mod storage;
pub mod stream;
pub mod view;

pub use composer::{Composer, Submission};
pub use error::{Error, Result};
pub use log::LocalLog;
pub use models::*;
pub use sequence::{Change, MessageSequence, Notification};
pub use service::{Feed, LogService, SubscriptionId};
pub use session::{IdentityProvider, Login, Session};
pub use storage::Database;
pub use stream::{ListenerId, MessageStream, StreamHandle};
pub use view::{Presenter, ScrollUnavailable, ViewController, ViewMode};

/// Room used when none is configured
pub const DEFAULT_ROOM: &str = "messages";
