//! Mailbox-internal envelope wrapping a [`Message`] payload with delivery metadata.

use agentmesh_wire::AgentId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::traits::{Message, MessagePriority};

/// Wraps a mailbox payload with sender/correlation/TTL metadata.
///
/// Distinct from `agentmesh_wire::Envelope`: this is the in-process
/// queue item a worker's mailbox moves around, not the wire format.
#[derive(Debug, Clone)]
pub struct MessageEnvelope<M: Message> {
    pub payload: M,
    pub sender: Option<AgentId>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub priority: MessagePriority,
    pub ttl: Option<u64>,
}

impl<M: Message> MessageEnvelope<M> {
    pub fn new(payload: M) -> Self {
        let priority = payload.priority();
        Self {
            payload,
            sender: None,
            timestamp: Utc::now(),
            correlation_id: None,
            priority,
            ttl: None,
        }
    }

    pub fn with_sender(mut self, sender: AgentId) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl = Some(ttl_seconds);
        self
    }

    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = Utc::now()
                    .signed_duration_since(self.timestamp)
                    .num_seconds()
                    .max(0) as u64;
                age > ttl
            }
            None => false,
        }
    }

    pub fn message_type(&self) -> &'static str {
        M::MESSAGE_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestMessage;

    impl Message for TestMessage {
        const MESSAGE_TYPE: &'static str = "test_message";
    }

    #[test]
    fn envelope_carries_priority_from_payload() {
        let envelope = MessageEnvelope::new(TestMessage);
        assert_eq!(envelope.message_type(), "test_message");
        assert_eq!(envelope.priority, MessagePriority::Normal);
        assert!(envelope.sender.is_none());
    }

    #[test]
    fn builder_chain_sets_metadata() {
        let sender = AgentId::new("echo", "alice").unwrap();
        let correlation_id = Uuid::new_v4();
        let envelope = MessageEnvelope::new(TestMessage)
            .with_sender(sender.clone())
            .with_correlation_id(correlation_id)
            .with_ttl(60);

        assert_eq!(envelope.sender, Some(sender));
        assert_eq!(envelope.correlation_id, Some(correlation_id));
        assert_eq!(envelope.ttl, Some(60));
    }

    #[test]
    fn ttl_expiry() {
        let mut envelope = MessageEnvelope::new(TestMessage).with_ttl(1);
        assert!(!envelope.is_expired());
        envelope.timestamp = Utc::now() - chrono::Duration::seconds(5);
        assert!(envelope.is_expired());
    }

    #[test]
    fn no_ttl_never_expires() {
        let mut envelope = MessageEnvelope::new(TestMessage);
        envelope.timestamp = Utc::now() - chrono::Duration::seconds(1000);
        assert!(!envelope.is_expired());
    }
}
