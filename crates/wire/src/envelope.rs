//! Domain envelope types and their wire (protobuf) conversions.
//!
//! The hand-written types here are what the rest of the runtime works
//! with; `proto` types are only seen at the tonic transport boundary.
//! Keeping the two separate means a change to the wire schema never leaks
//! `Option`/`HashMap` prost idiosyncrasies into gateway/worker logic.

use std::collections::HashMap;

use crate::errors::FormatError;
use crate::ids::{AgentId, TopicId};
use crate::proto;
use crate::subscription::Subscription;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub source: AgentId,
    pub target: AgentId,
    pub method: Option<String>,
    pub payload: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub payload: Option<Vec<u8>>,
    pub error: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub id: String,
    pub topic: TopicId,
    pub source: String,
    pub payload: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSubscriptionEnvelope {
    pub request_id: String,
    pub subscription: Subscription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionAckEnvelope {
    pub request_id: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveSubscriptionEnvelope {
    pub request_id: String,
    pub subscription_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAgentTypeEnvelope {
    pub request_id: String,
    pub agent_type: String,
    pub events: Vec<String>,
    pub topics: Vec<String>,
}

/// Tagged union of every message that can cross the `OpenChannel` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// First message sent by the gateway once a stream is accepted.
    ChannelOpened { connection_id: String },
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
    Event(EventEnvelope),
    AddSubscription(AddSubscriptionEnvelope),
    AddSubscriptionResponse(SubscriptionAckEnvelope),
    RemoveSubscription(RemoveSubscriptionEnvelope),
    RemoveSubscriptionResponse(SubscriptionAckEnvelope),
    RegisterAgentType(RegisterAgentTypeEnvelope),
    RegisterAgentTypeResponse(SubscriptionAckEnvelope),
}

impl From<&AgentId> for proto::AgentIdProto {
    fn from(id: &AgentId) -> Self {
        Self {
            r#type: id.agent_type().to_string(),
            key: id.key().to_string(),
        }
    }
}

impl TryFrom<proto::AgentIdProto> for AgentId {
    type Error = FormatError;

    fn try_from(value: proto::AgentIdProto) -> Result<Self, Self::Error> {
        AgentId::new(value.r#type, value.key)
    }
}

impl From<&TopicId> for proto::TopicIdProto {
    fn from(id: &TopicId) -> Self {
        Self {
            r#type: id.topic_type().to_string(),
            source: id.source().to_string(),
        }
    }
}

impl TryFrom<proto::TopicIdProto> for TopicId {
    type Error = FormatError;

    fn try_from(value: proto::TopicIdProto) -> Result<Self, Self::Error> {
        TopicId::new(value.r#type, value.source)
    }
}

impl From<&Subscription> for proto::SubscriptionProto {
    fn from(sub: &Subscription) -> Self {
        let kind = match sub {
            Subscription::TypeSubscription {
                topic_type,
                agent_type,
            } => proto::subscription_proto::Kind::Exact(proto::TypeSubscriptionProto {
                topic_type: topic_type.clone(),
                agent_type: agent_type.clone(),
            }),
            Subscription::TypePrefixSubscription {
                topic_type_prefix,
                agent_type,
            } => proto::subscription_proto::Kind::Prefix(proto::TypePrefixSubscriptionProto {
                topic_type_prefix: topic_type_prefix.clone(),
                agent_type: agent_type.clone(),
            }),
        };
        Self { kind: Some(kind) }
    }
}

impl TryFrom<proto::SubscriptionProto> for Subscription {
    type Error = FormatError;

    fn try_from(value: proto::SubscriptionProto) -> Result<Self, Self::Error> {
        match value.kind.ok_or_else(|| FormatError::malformed("subscription"))? {
            proto::subscription_proto::Kind::Exact(e) => Ok(Subscription::TypeSubscription {
                topic_type: e.topic_type,
                agent_type: e.agent_type,
            }),
            proto::subscription_proto::Kind::Prefix(p) => {
                Ok(Subscription::TypePrefixSubscription {
                    topic_type_prefix: p.topic_type_prefix,
                    agent_type: p.agent_type,
                })
            }
        }
    }
}

impl From<Envelope> for proto::Envelope {
    fn from(envelope: Envelope) -> Self {
        use proto::envelope::Kind;

        let kind = match envelope {
            Envelope::ChannelOpened { connection_id } => {
                Kind::ChannelOpened(proto::ChannelOpened { connection_id })
            }
            Envelope::Request(r) => Kind::Request(proto::RequestProto {
                request_id: r.request_id,
                source: Some((&r.source).into()),
                target: Some((&r.target).into()),
                method: r.method,
                payload: r.payload,
                metadata: r.metadata,
            }),
            Envelope::Response(r) => Kind::Response(proto::ResponseProto {
                request_id: r.request_id,
                payload: r.payload,
                error: r.error,
                metadata: r.metadata,
            }),
            Envelope::Event(e) => Kind::Event(proto::EventProto {
                id: e.id,
                topic: Some((&e.topic).into()),
                source: e.source,
                payload: e.payload,
                attributes: e.attributes,
            }),
            Envelope::AddSubscription(a) => Kind::AddSubscription(proto::AddSubscriptionProto {
                request_id: a.request_id,
                subscription: Some((&a.subscription).into()),
            }),
            Envelope::AddSubscriptionResponse(a) => {
                Kind::AddSubscriptionResponse(proto::AddSubscriptionResponseProto {
                    request_id: a.request_id,
                    success: a.success,
                    error: a.error,
                })
            }
            Envelope::RemoveSubscription(r) => {
                Kind::RemoveSubscription(proto::RemoveSubscriptionProto {
                    request_id: r.request_id,
                    subscription_id: r.subscription_id,
                })
            }
            Envelope::RemoveSubscriptionResponse(r) => {
                Kind::RemoveSubscriptionResponse(proto::RemoveSubscriptionResponseProto {
                    request_id: r.request_id,
                    success: r.success,
                    error: r.error,
                })
            }
            Envelope::RegisterAgentType(r) => {
                Kind::RegisterAgentType(proto::RegisterAgentTypeProto {
                    request_id: r.request_id,
                    agent_type: r.agent_type,
                    events: r.events,
                    topics: r.topics,
                })
            }
            Envelope::RegisterAgentTypeResponse(r) => {
                Kind::RegisterAgentTypeResponse(proto::RegisterAgentTypeResponseProto {
                    request_id: r.request_id,
                    success: r.success,
                    error: r.error,
                })
            }
        };
        proto::Envelope { kind: Some(kind) }
    }
}

impl TryFrom<proto::Envelope> for Envelope {
    type Error = FormatError;

    fn try_from(value: proto::Envelope) -> Result<Self, Self::Error> {
        use proto::envelope::Kind;

        let kind = value.kind.ok_or_else(|| FormatError::malformed("envelope"))?;
        Ok(match kind {
            Kind::ChannelOpened(c) => Envelope::ChannelOpened {
                connection_id: c.connection_id,
            },
            Kind::Request(r) => Envelope::Request(RequestEnvelope {
                request_id: r.request_id,
                source: r.source.ok_or_else(|| FormatError::malformed("request.source"))?.try_into()?,
                target: r.target.ok_or_else(|| FormatError::malformed("request.target"))?.try_into()?,
                method: r.method,
                payload: r.payload,
                metadata: r.metadata,
            }),
            Kind::Response(r) => Envelope::Response(ResponseEnvelope {
                request_id: r.request_id,
                payload: r.payload,
                error: r.error,
                metadata: r.metadata,
            }),
            Kind::Event(e) => Envelope::Event(EventEnvelope {
                id: e.id,
                topic: e.topic.ok_or_else(|| FormatError::malformed("event.topic"))?.try_into()?,
                source: e.source,
                payload: e.payload,
                attributes: e.attributes,
            }),
            Kind::AddSubscription(a) => Envelope::AddSubscription(AddSubscriptionEnvelope {
                request_id: a.request_id,
                subscription: a
                    .subscription
                    .ok_or_else(|| FormatError::malformed("add_subscription.subscription"))?
                    .try_into()?,
            }),
            Kind::AddSubscriptionResponse(a) => {
                Envelope::AddSubscriptionResponse(SubscriptionAckEnvelope {
                    request_id: a.request_id,
                    success: a.success,
                    error: a.error,
                })
            }
            Kind::RemoveSubscription(r) => Envelope::RemoveSubscription(RemoveSubscriptionEnvelope {
                request_id: r.request_id,
                subscription_id: r.subscription_id,
            }),
            Kind::RemoveSubscriptionResponse(r) => {
                Envelope::RemoveSubscriptionResponse(SubscriptionAckEnvelope {
                    request_id: r.request_id,
                    success: r.success,
                    error: r.error,
                })
            }
            Kind::RegisterAgentType(r) => Envelope::RegisterAgentType(RegisterAgentTypeEnvelope {
                request_id: r.request_id,
                agent_type: r.agent_type,
                events: r.events,
                topics: r.topics,
            }),
            Kind::RegisterAgentTypeResponse(r) => {
                Envelope::RegisterAgentTypeResponse(SubscriptionAckEnvelope {
                    request_id: r.request_id,
                    success: r.success,
                    error: r.error,
                })
            }
        })
    }
}
