//! Gateway server binary: binds the `AgentMesh` tonic service and serves
//! worker connections until killed.

use std::sync::Arc;
use std::time::Duration;

use agentmesh_gateway::{
    AgentMeshService, GatewayConfig, GatewayShared, InMemoryAgentStateStore, MessageRegistry, PendingRequestTable,
    RegistryGrain, SubscriptionIndex, WorkerDirectory,
};
use agentmesh_wire::monitoring::{InMemoryMonitor, MonitoringConfig};
use agentmesh_wire::proto::agent_mesh_server::AgentMeshServer;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::default().with_env_overrides();
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    let addr = config.listen_addr.parse()?;

    let monitor = InMemoryMonitor::<agentmesh_gateway::GatewayEvent>::new(MonitoringConfig::default());
    let directory = Arc::new(WorkerDirectory::new());
    let registry_ref = Arc::new(RegistryGrain::new());
    let shared = Arc::new(GatewayShared {
        registry: registry_ref.clone(),
        directory: directory.clone(),
        pending: Arc::new(PendingRequestTable::new()),
        subscriptions: Arc::new(SubscriptionIndex::new()),
        state_store: Arc::new(InMemoryAgentStateStore::new()),
        message_registry: Arc::new(MessageRegistry::new(
            config.event_buffer_hold_time,
            config.max_entry_bytes,
            config.max_queue_bytes,
        )),
        config: config.clone(),
        monitor,
    });

    spawn_liveness_ticker(shared.clone(), config.self_registration_retry);
    spawn_buffer_sweeper(shared.clone());

    tracing::info!(addr = %config.listen_addr, "agentmesh gateway listening");
    let service = AgentMeshService::new(shared);
    Server::builder()
        .add_service(AgentMeshServer::new(service))
        .serve(addr)
        .await?;

    Ok(())
}

/// Periodic heartbeat at `self_registration_retry` cadence, logging worker
/// and placement counts — the gateway has no parent to register with, so
/// this stands in for the "confirm I'm still reachable" check §6.4
/// describes for a worker's self-registration retry, applied to the
/// gateway's own liveness instead.
fn spawn_liveness_ticker(shared: Arc<GatewayShared<InMemoryMonitor<agentmesh_gateway::GatewayEvent>>>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            tracing::debug!(
                workers = shared.directory.len(),
                placements = shared.registry.placement_count(),
                "gateway liveness tick"
            );
        }
    });
}

/// Sweeps the event buffer into the dead-letter queue on the configured
/// hold time, independent of any single connection's traffic.
fn spawn_buffer_sweeper(shared: Arc<GatewayShared<InMemoryMonitor<agentmesh_gateway::GatewayEvent>>>) {
    let hold_time = shared.config.event_buffer_hold_time;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(hold_time.max(Duration::from_millis(100)));
        loop {
            ticker.tick().await;
            let dead = shared.message_registry.sweep_expired();
            for event in dead {
                tracing::warn!(event_id = %event.id, topic = %event.topic.to_canonical(), "event dead-lettered");
            }
        }
    });
}
