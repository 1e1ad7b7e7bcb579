//! Bounded mailbox backed by a tokio mpsc channel, with backpressure handling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use super::backpressure::BackpressureStrategy;
use super::metrics::{AtomicMetrics, MetricsRecorder};
use super::traits::{MailboxCapacity, MailboxError, MailboxReceiver, MailboxSender, TryRecvError};
use crate::message::{Message, MessageEnvelope};

pub struct BoundedMailbox<M: Message, R: MetricsRecorder = AtomicMetrics> {
    receiver: mpsc::Receiver<MessageEnvelope<M>>,
    capacity: usize,
    pub metrics: Arc<R>,
}

#[derive(Clone)]
pub struct BoundedMailboxSender<M: Message, R: MetricsRecorder = AtomicMetrics> {
    sender: mpsc::Sender<MessageEnvelope<M>>,
    backpressure_strategy: Arc<BackpressureStrategy>,
    capacity: usize,
    pub metrics: Arc<R>,
}

impl<M: Message, R: MetricsRecorder> BoundedMailbox<M, R> {
    pub fn with_metrics(capacity: usize, metrics: R) -> (Self, BoundedMailboxSender<M, R>) {
        Self::with_backpressure_and_metrics(capacity, BackpressureStrategy::Error, metrics)
    }

    pub fn with_backpressure_and_metrics(
        capacity: usize,
        strategy: BackpressureStrategy,
        metrics: R,
    ) -> (Self, BoundedMailboxSender<M, R>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let metrics = Arc::new(metrics);

        let mailbox = Self {
            receiver,
            capacity,
            metrics: Arc::clone(&metrics),
        };
        let sender = BoundedMailboxSender {
            sender,
            backpressure_strategy: Arc::new(strategy),
            capacity,
            metrics,
        };
        (mailbox, sender)
    }
}

impl<M: Message> BoundedMailbox<M, AtomicMetrics> {
    pub fn new(capacity: usize) -> (Self, BoundedMailboxSender<M, AtomicMetrics>) {
        Self::with_metrics(capacity, AtomicMetrics::new())
    }

    pub fn with_backpressure(
        capacity: usize,
        strategy: BackpressureStrategy,
    ) -> (Self, BoundedMailboxSender<M, AtomicMetrics>) {
        Self::with_backpressure_and_metrics(capacity, strategy, AtomicMetrics::new())
    }
}

#[async_trait]
impl<M: Message, R: MetricsRecorder> MailboxReceiver<M> for BoundedMailbox<M, R> {
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
        MailboxCapacity::Bounded(self.capacity)
    }

    fn len(&self) -> usize {
        self.metrics.in_flight() as usize
    }
}

#[async_trait]
impl<M: Message, R: MetricsRecorder + Clone> MailboxSender<M> for BoundedMailboxSender<M, R> {
    type Error = MailboxError;

    async fn send(&self, envelope: MessageEnvelope<M>) -> Result<(), Self::Error> {
        self.backpressure_strategy
            .apply(&self.sender, envelope)
            .await?;
        self.metrics.record_sent();
        Ok(())
    }

    fn try_send(&self, envelope: MessageEnvelope<M>) -> Result<(), Self::Error> {
        self.sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailboxError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => MailboxError::Closed,
        })?;
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
    async fn creation_reports_capacity() {
        let (mailbox, _sender): (BoundedMailbox<TestMessage>, _) = BoundedMailbox::new(10);
        assert_eq!(mailbox.capacity(), MailboxCapacity::Bounded(10));
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn send_then_receive() {
        let (mut mailbox, sender) = BoundedMailbox::new(10);
        sender
            .send(MessageEnvelope::new(TestMessage {
                content: "test".to_string(),
            }))
            .await
            .unwrap();

        let received = mailbox.recv().await.unwrap();
        assert_eq!(received.payload.content, "test");
    }

    #[tokio::test]
    async fn capacity_enforced_on_try_send() {
        let (_mailbox, sender) = BoundedMailbox::new(2);
        sender
            .try_send(MessageEnvelope::new(TestMessage {
                content: "1".to_string(),
            }))
            .unwrap();
        sender
            .try_send(MessageEnvelope::new(TestMessage {
                content: "2".to_string(),
            }))
            .unwrap();

        let result = sender.try_send(MessageEnvelope::new(TestMessage {
            content: "3".to_string(),
        }));
        assert!(matches!(result, Err(MailboxError::Full { .. })));
    }

    #[tokio::test]
    async fn try_recv_on_empty_mailbox() {
        let (mut mailbox, _sender): (BoundedMailbox<TestMessage>, _) = BoundedMailbox::new(10);
        assert!(matches!(mailbox.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn metrics_track_send_and_receive() {
        let (mut mailbox, sender) = BoundedMailbox::new(10);
        sender
            .send(MessageEnvelope::new(TestMessage {
                content: "test".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(mailbox.metrics.sent_count(), 1);

        mailbox.recv().await.unwrap();
        assert_eq!(mailbox.metrics.received_count(), 1);
    }

    #[tokio::test]
    async fn closed_mailbox_rejects_sends() {
        let (mailbox, sender) = BoundedMailbox::new(10);
        drop(mailbox);

        let result = sender
            .send(MessageEnvelope::new(TestMessage {
                content: "test".to_string(),
            }))
            .await;
        assert!(matches!(result, Err(MailboxError::Closed)));
    }

    #[tokio::test]
    async fn expired_messages_are_skipped_and_counted_as_dropped() {
        let (mut mailbox, sender) = BoundedMailbox::new(10);

        let mut expired = MessageEnvelope::new(TestMessage {
            content: "expired".to_string(),
        });
        expired.timestamp = Utc::now() - chrono::Duration::seconds(10);
        expired.ttl = Some(1);
        sender.send(expired).await.unwrap();

        sender
            .send(MessageEnvelope::new(TestMessage {
                content: "valid".to_string(),
            }))
            .await
            .unwrap();

        let received = mailbox.recv().await.unwrap();
        assert_eq!(received.payload.content, "valid");
        assert_eq!(mailbox.metrics.dropped_count(), 1);
    }
}
