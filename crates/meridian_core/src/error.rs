//! Error types for the aggregation core.
//!
//! None of these are fatal to an actor: the offending message is dropped,
//! the failure logged, and processing continues with the next message.

use crate::types::RegionKey;

/// Failures that can occur while routing, delivering or applying a message.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    /// No node is registered to own the key
    #[error("No route for partition {key}")]
    NoRoute { key: String },

    /// The target mailbox has no free capacity; the message was dropped
    #[error("Mailbox full: {target}")]
    MailboxFull { target: String },

    /// The target actor has stopped
    #[error("Mailbox closed: {target}")]
    MailboxClosed { target: String },

    /// A message reached a partition it does not belong to
    #[error("Unexpected message for {key}: {reason}")]
    UnexpectedMessage { key: RegionKey, reason: String },

    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Malformed geometry or event shape at the aggregation boundary
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
