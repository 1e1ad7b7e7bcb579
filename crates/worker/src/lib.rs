//! Worker-side runtime: mailbox, agent activation, subscription mirror, and
//! the gateway connection that ties them to the cluster (§4.5, §6.2).
//!
//! `agentmesh_gateway` owns placement and the cluster-global view; this
//! crate owns one worker process's slice of it — the agents it has actually
//! activated, and the stream that carries work in and responses out.

pub mod activation;
pub mod agent;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod factory;
pub mod mailbox;
pub mod message;
pub mod pending;
pub mod subscriptions;

pub use activation::{ActivationHandle, ActivationTable, UnknownAgentType};
pub use agent::{Agent, AgentContext, AgentError, AgentFactory, AgentMessage, AgentMetadata, FnAgentFactory, RuntimeOps};
pub use client::{GatewayClient, ReconnectBackoff};
pub use config::WorkerConfig;
pub use dispatcher::Dispatcher;
pub use error::WorkerError;
pub use events::WorkerEvent;
pub use factory::AgentFactoryRegistry;
pub use pending::ClientRequestTable;
pub use subscriptions::LocalSubscriptions;
