//! Wire protocol, envelope types, and shared observability primitives for
//! the agentmesh distributed agent runtime.
//!
//! This crate has no opinion on placement, routing, or activation — it
//! only defines what crosses the gateway/worker boundary (`Envelope`,
//! `AgentId`, `TopicId`, `Subscription`, `AgentState`) and the generic
//! `Monitor<E>` observability surface both sides build on.

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod monitoring;
pub mod state;
pub mod subscription;

pub mod proto {
    tonic::include_proto!("agentmesh.wire.v1");
}

pub use envelope::{
    AddSubscriptionEnvelope, Envelope, EventEnvelope, RegisterAgentTypeEnvelope,
    RemoveSubscriptionEnvelope, RequestEnvelope, ResponseEnvelope, SubscriptionAckEnvelope,
};
pub use errors::FormatError;
pub use ids::{AgentId, TopicId};
pub use state::AgentState;
pub use subscription::{Subscription, SubscriptionId};
