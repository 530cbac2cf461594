//! Log service interface
//!
//! The durable log service persists room messages, assigns ids and
//! timestamps, and pushes change notifications to subscribers. Implementations
//! may be in-process ([`crate::LocalLog`]), remote, or test fakes.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{Ack, NewMessage, RoomId};
use crate::sequence::Notification;

/// Identifies one live subscription on a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Notifications for one subscription, in the order the service sent them
#[derive(Debug)]
pub struct Feed {
    pub id: SubscriptionId,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

#[async_trait]
pub trait LogService: Send + Sync {
    /// Start receiving notifications for a room. The first notification is
    /// normally a snapshot of the current log.
    async fn subscribe(&self, room: &RoomId) -> Result<Feed>;

    /// Release a subscription. Unknown or already released ids are ignored.
    fn unsubscribe(&self, subscription: SubscriptionId);

    /// Append a message; the service assigns its id and creation time
    async fn append(&self, room: &RoomId, message: NewMessage) -> Result<Ack>;
}
