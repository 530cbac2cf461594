//! Data models for roomchat

mod identity;
mod message;

pub use identity::*;
pub use message::*;
