//! Cluster-global gateway: worker directory, placement registry,
//! subscription index, pending-request correlation, and the dead-letter /
//! event-buffer store, fronted by a tonic `AgentMesh` service.

pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod events;
pub mod message_registry;
pub mod pending;
pub mod registry;
pub mod service;
pub mod state_store;
pub mod subscription_index;

pub use config::GatewayConfig;
pub use connection::{ConnectionState, GatewayShared, WorkerConnection};
pub use directory::{SharedDirectory, WorkerDirectory, WorkerHandle};
pub use error::GatewayError;
pub use events::GatewayEvent;
pub use message_registry::MessageRegistry;
pub use pending::{PendingRequestTable, SharedPendingTable};
pub use registry::{RegistryGrain, SharedRegistry, WorkerId};
pub use service::AgentMeshService;
pub use state_store::{AgentStateStore, InMemoryAgentStateStore, SharedStateStore};
pub use subscription_index::{SharedSubscriptionIndex, SubscriptionIndex};
