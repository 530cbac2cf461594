//! Outgoing message composer
//!
//! The draft is only cleared after the log service acknowledges the append.
//! Whitespace-only drafts are ignored without contacting the service. The
//! composer never touches the message sequence: the sent message shows up
//! once the service's notification comes back through the stream.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{Ack, NewMessage, RoomId};
use crate::service::LogService;
use crate::session::Session;

/// Outcome of a successful [`Composer::submit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Draft was empty or whitespace; nothing was sent
    Ignored,
    /// The service accepted the message
    Sent(Ack),
}

pub struct Composer {
    service: Arc<dyn LogService>,
    room: RoomId,
    draft: String,
}

impl Composer {
    pub fn new(service: Arc<dyn LogService>, room: RoomId) -> Self {
        Self {
            service,
            room,
            draft: String::new(),
        }
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Append the draft to the room log as the signed-in user.
    ///
    /// The append is spawned, so it completes even if this future is dropped.
    pub async fn submit(&mut self, session: &Session) -> Result<Submission> {
        let identity = session.require()?;

        if self.draft.trim().is_empty() {
            debug!(room = %self.room, "Ignoring empty draft");
            return Ok(Submission::Ignored);
        }

        let request = NewMessage {
            author_id: identity.id,
            author_display_name: identity.display_name,
            text: self.draft.clone(),
        };

        let service = self.service.clone();
        let room = self.room.clone();
        let outcome = tokio::spawn(async move { service.append(&room, request).await })
            .await
            .map_err(|e| Error::Service(format!("append task failed: {}", e)))?;

        match outcome {
            Ok(ack) => {
                info!(room = %self.room, message_id = %ack.id, "Message sent");
                self.draft.clear();
                Ok(Submission::Sent(ack))
            }
            Err(e) => {
                warn!(room = %self.room, error = %e, "Send failed, keeping draft");
                Err(e)
            }
        }
    }
}
