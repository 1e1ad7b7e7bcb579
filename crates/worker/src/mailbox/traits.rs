//! Core mailbox traits: generic receiver/sender, capacity, and error types.

use std::error::Error;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::message::{Message, MessageEnvelope};

/// Receives messages from a single agent's mailbox.
///
/// Owned exclusively by the dispatcher driving one agent; not cloneable.
#[async_trait]
pub trait MailboxReceiver<M: Message>: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    /// Returns `None` once the mailbox is closed and drained.
    async fn recv(&mut self) -> Option<MessageEnvelope<M>>;

    fn try_recv(&mut self) -> Result<MessageEnvelope<M>, TryRecvError>;

    fn capacity(&self) -> MailboxCapacity;

    /// Approximate queue depth, derived from sent/received counters.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sends messages into a mailbox. Cheap to clone; shared across callers.
#[async_trait]
pub trait MailboxSender<M: Message>: Send + Sync + Clone {
    type Error: Error + Send + Sync + 'static;

    /// Behavior on a full mailbox depends on the configured backpressure strategy.
    async fn send(&self, envelope: MessageEnvelope<M>) -> Result<(), Self::Error>;

    fn try_send(&self, envelope: MessageEnvelope<M>) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxCapacity {
    Bounded(usize),
    Unbounded,
}

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox is full (capacity: {capacity})")]
    Full { capacity: usize },

    #[error("mailbox is closed")]
    Closed,

    #[error("backpressure applied: {strategy:?}")]
    BackpressureApplied {
        strategy: crate::mailbox::BackpressureStrategy,
    },

    #[error("ttl expired for message at {timestamp}")]
    TtlExpired { timestamp: DateTime<Utc> },
}

#[derive(Debug, thiserror::Error)]
pub enum TryRecvError {
    #[error("mailbox is empty")]
    Empty,

    #[error("mailbox is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_equality() {
        assert_eq!(MailboxCapacity::Bounded(100), MailboxCapacity::Bounded(100));
        assert_ne!(MailboxCapacity::Bounded(100), MailboxCapacity::Unbounded);
    }

    #[test]
    fn error_messages() {
        assert!(MailboxError::Full { capacity: 10 }.to_string().contains("10"));
        assert_eq!(MailboxError::Closed.to_string(), "mailbox is closed");
        assert_eq!(TryRecvError::Empty.to_string(), "mailbox is empty");
    }
}
