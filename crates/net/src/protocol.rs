//! Network protocol message types
//!
//! All frames are JSON-serialized and length-prefixed on the wire. Every
//! request carries a client-chosen `id`; replies and notifications echo it.

use roomchat_core::{Ack, Message, NewMessage, Notification, RoomId};
use serde::{Deserialize, Serialize};

use crate::frame::MAX_FRAME_SIZE;

/// Budget for the messages carried by one snapshot chunk, leaving headroom
/// under the frame cap for the envelope
pub const SNAPSHOT_CHUNK_BYTES: usize = MAX_FRAME_SIZE as usize / 2;

/// Network protocol frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client asks for a room's notifications
    Subscribe { id: u64, room: RoomId },

    /// Server accepted a subscription; notifications follow
    Subscribed { id: u64 },

    /// Client releases a subscription
    Unsubscribe { id: u64 },

    /// Part of a room snapshot. The client delivers the snapshot once the
    /// chunk marked `done` arrives.
    SnapshotChunk {
        id: u64,
        messages: Vec<Message>,
        done: bool,
    },

    /// Diff notification for a live subscription
    Notify {
        id: u64,
        notification: Notification,
    },

    /// Client appends a message to a room
    Append {
        id: u64,
        room: RoomId,
        message: NewMessage,
    },

    /// Server accepted an append
    Appended { id: u64, ack: Ack },

    /// Server refused a subscribe or append request
    Failed { id: u64, reason: String },

    /// Server is shutting down
    ServerShutdown,
}

impl Frame {
    /// Frames carrying a notification, splitting snapshots into chunks that
    /// each fit in a frame
    pub fn for_notification(id: u64, notification: Notification) -> Vec<Frame> {
        let Notification::Snapshot(messages) = notification else {
            return vec![Frame::Notify { id, notification }];
        };

        let mut frames = Vec::new();
        let mut chunk = Vec::new();
        let mut chunk_bytes = 0;
        for message in messages {
            let size = serde_json::to_vec(&message).map_or(0, |bytes| bytes.len());
            if !chunk.is_empty() && chunk_bytes + size > SNAPSHOT_CHUNK_BYTES {
                frames.push(Frame::SnapshotChunk {
                    id,
                    messages: std::mem::take(&mut chunk),
                    done: false,
                });
                chunk_bytes = 0;
            }
            chunk_bytes += size;
            chunk.push(message);
        }
        frames.push(Frame::SnapshotChunk {
            id,
            messages: chunk,
            done: true,
        });
        frames
    }

    /// Serialize frame to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize frame from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
