//! Unbounded mailbox for actors that must never block message delivery.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use super::metrics::{AtomicMetrics, MetricsRecorder};
use super::traits::{MailboxCapacity, MailboxError, MailboxReceiver, MailboxSender, TryRecvError};
use crate::message::{Message, MessageEnvelope};

pub struct UnboundedMailbox<M: Message, R: MetricsRecorder = AtomicMetrics> {
    receiver: mpsc::UnboundedReceiver<MessageEnvelope<M>>,
    pub metrics: Arc<R>,
}

#[derive(Clone)]
pub struct UnboundedMailboxSender<M: Message, R: MetricsRecorder = AtomicMetrics> {
    sender: mpsc::UnboundedSender<MessageEnvelope<M>>,
    pub metrics: Arc<R>,
}

impl<M: Message, R: MetricsRecorder> UnboundedMailbox<M, R> {
    pub fn with_metrics(metrics: R) -> (Self, UnboundedMailboxSender<M, R>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let metrics = Arc::new(metrics);
        let mailbox = Self {
            receiver,
            metrics: Arc::clone(&metrics),
        };
        let sender = UnboundedMailboxSender { sender, metrics };
        (mailbox, sender)
    }
}

impl<M: Message> UnboundedMailbox<M, AtomicMetrics> {
    pub fn new() -> (Self, UnboundedMailboxSender<M, AtomicMetrics>) {
        Self::with_metrics(AtomicMetrics::new())
    }
}

#[async_trait]
impl<M: Message, R: MetricsRecorder> MailboxReceiver<M> for UnboundedMailbox<M, R> {
    type Error = MailboxError;

    async fn recv(&mut self) -> Option<MessageEnvelope<M>> {
        loop {
            let envelope = self.receiver.recv().await?;
            if envelope.is_expired() {
                self.metrics.record_dropped();
                continue;
            }
            self.metrics.record_received();
            self.metrics.update_last_message(Utc::now());
            return Some(envelope);
        }
    }

    fn try_recv(&mut self) -> Result<MessageEnvelope<M>, TryRecvError> {
        loop {
            let envelope = self.receiver.try_recv().map_err(|e| match e {
                mpsc::error::TryRecvError::Empty => TryRecvError::Empty,
                mpsc::error::TryRecvError::Disconnected => TryRecvError::Closed,
            })?;
            if envelope.is_expired() {
                self.metrics.record_dropped();
                continue;
            }
            self.metrics.record_received();
            self.metrics.update_last_message(Utc::now());
            return Ok(envelope);
        }
    }

    fn capacity(&self) -> MailboxCapacity {
        MailboxCapacity::Unbounded
    }

    fn len(&self) -> usize {
        self.metrics.in_flight() as usize
    }
}

#[async_trait]
impl<M: Message, R: MetricsRecorder + Clone> MailboxSender<M> for UnboundedMailboxSender<M, R> {
    type Error = MailboxError;

    async fn send(&self, envelope: MessageEnvelope<M>) -> Result<(), Self::Error> {
        self.try_send(envelope)
    }

    fn try_send(&self, envelope: MessageEnvelope<M>) -> Result<(), Self::Error> {
        self.sender
            .send(envelope)
            .map_err(|_| MailboxError::Closed)?;
        self.metrics.record_sent();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestMessage {
        content: String,
    }

    impl Message for TestMessage {
        const MESSAGE_TYPE: &'static str = "test_message";
    }

    #[tokio::test]
    async fn reports_unbounded_capacity() {
        let (mailbox, _sender): (UnboundedMailbox<TestMessage>, _) = UnboundedMailbox::new();
        assert_eq!(mailbox.capacity(), MailboxCapacity::Unbounded);
    }

    #[tokio::test]
    async fn never_rejects_on_volume() {
        let (mut mailbox, sender) = UnboundedMailbox::new();
        for i in 0..1000 {
            sender
                .send(MessageEnvelope::new(TestMessage {
                    content: i.to_string(),
                }))
                .await
                .unwrap();
        }
        for _ in 0..1000 {
            mailbox.recv().await.unwrap();
        }
        assert_eq!(mailbox.metrics.received_count(), 1000);
    }

    #[tokio::test]
    async fn closed_mailbox_rejects_sends() {
        let (mailbox, sender) = UnboundedMailbox::new();
        drop(mailbox);
        let result = sender
            .send(MessageEnvelope::new(TestMessage {
                content: "test".to_string(),
            }))
            .await;
        assert!(matches!(result, Err(MailboxError::Closed)));
    }
}
