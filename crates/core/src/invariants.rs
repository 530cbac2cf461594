//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use crate::models::Message;

/// Validate that a message sequence is strictly ordered by `(created_at, id)`
pub fn assert_sequence_invariants(messages: &[Message]) {
    debug_assert!(
        messages
            .windows(2)
            .all(|pair| pair[0].order_key() < pair[1].order_key()),
        "Message sequence out of order"
    );

    if cfg!(debug_assertions) {
        let mut seen = HashSet::with_capacity(messages.len());
        for message in messages {
            debug_assert!(
                seen.insert(&message.id),
                "Message {} appears twice in sequence",
                message.id
            );
        }
    }
}

/// Validate that a service-assigned timestamp advanced past the previous one
pub fn assert_monotonic(previous: Option<i64>, assigned: i64) {
    debug_assert!(
        previous.map_or(true, |p| assigned > p),
        "Timestamp {} does not advance past {:?}",
        assigned,
        previous
    );
}
