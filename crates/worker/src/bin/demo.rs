//! Demo worker binary: a single `echo` agent type that answers a request
//! with the bytes it was sent, wired up to a running gateway.
//!
//! Run alongside the gateway server; registers the `echo` type, opens the
//! channel, and serves traffic until killed.

use std::sync::Arc;

use agentmesh_wire::monitoring::{InMemoryMonitor, MonitoringConfig};
use agentmesh_wire::AgentId;
use agentmesh_worker::agent::{Agent, AgentContext, AgentError, AgentMessage, FnAgentFactory};
use agentmesh_worker::{AgentFactoryRegistry, Dispatcher, WorkerConfig, WorkerEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn handle(
        &mut self,
        message: AgentMessage,
        ctx: &mut AgentContext,
    ) -> Result<Option<Vec<u8>>, AgentError> {
        tracing::info!(agent = %ctx.self_id, is_rpc = ctx.is_rpc, "echo handling message");
        Ok(Some(message.payload().to_vec()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WorkerConfig::builder()
        .gateway_addr(std::env::var("AGENTMESH_GATEWAY_ADDR").unwrap_or_else(|_| "http://127.0.0.1:7700".to_string()))
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;

    let factories = AgentFactoryRegistry::new();
    factories.register("echo", Arc::new(FnAgentFactory(|_id: &AgentId| Box::new(EchoAgent) as Box<dyn Agent>)));

    let monitor = InMemoryMonitor::<WorkerEvent>::new(MonitoringConfig::default());
    let dispatcher = Dispatcher::new(config.clone(), factories, monitor);

    let (envelope_tx, envelope_rx) = mpsc::unbounded_channel();
    let run_dispatcher = dispatcher.clone();
    tokio::spawn(async move { run_dispatcher.run(envelope_rx).await });

    let dispatcher_for_connect = dispatcher.clone();
    let dispatcher_for_disconnect = dispatcher.clone();

    // `run_connection` never returns: it reconnects forever on failure, and
    // a worker with no gateway connection has nothing else useful to do.
    agentmesh_worker::client::run_connection(
        config,
        move |client| {
            dispatcher_for_connect.set_gateway(Some(client));
        },
        move |envelope| {
            let _ = envelope_tx.send(envelope);
        },
        move |reason| {
            tracing::warn!(%reason, "gateway connection dropped, reconnecting");
            dispatcher_for_disconnect.set_gateway(None);
        },
    )
    .await
}
