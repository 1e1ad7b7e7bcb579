//! `GatewayClient`: the worker's side of the `OpenChannel` stream, plus the
//! unary `GetState`/`SaveState`/`AddSubscription`/`RegisterAgent` stubs
//! (§4.1, §6.1), and reconnect-with-backoff on stream failure (§7).

use std::time::Duration;

use agentmesh_wire::proto::agent_mesh_client::AgentMeshClient;
use agentmesh_wire::{proto, AgentState, Envelope};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::transport::Channel;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerError;

/// Exponential backoff for stream reconnect attempts, capped between
/// `base_delay` and `max_delay`. Grounded in the same `base * 2^attempt`
/// shape as the teacher's `RestartBackoff`, trimmed down since reconnects
/// here aren't windowed against a restart-storm limit — a worker with a
/// dead gateway just keeps trying, forever, at the capped interval.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base_delay: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let capped_attempt = self.attempt.min(10);
        self.attempt += 1;
        let multiplier = 2u64.saturating_pow(capped_attempt);
        let delay_ms = self.base_delay.as_millis() as u64 * multiplier;
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Handle used by the rest of the worker to push envelopes onto the
/// `OpenChannel` stream and to issue the unary state/registration RPCs.
#[derive(Clone)]
pub struct GatewayClient {
    outbound: mpsc::UnboundedSender<proto::Envelope>,
    stub: AgentMeshClient<Channel>,
}

impl GatewayClient {
    /// Sends one envelope onto the shared outbound stream.
    pub fn send(&self, envelope: Envelope) -> Result<(), WorkerError> {
        self.outbound
            .send(envelope.into())
            .map_err(|_| WorkerError::Unavailable("outbound stream closed".to_string()))
    }

    pub async fn get_state(&self, agent_id: &agentmesh_wire::AgentId) -> Result<AgentState, WorkerError> {
        let mut stub = self.stub.clone();
        let response = stub
            .get_state(proto::AgentIdProto::from(agent_id))
            .await
            .map_err(|status| WorkerError::Unavailable(status.to_string()))?
            .into_inner();
        let state = response
            .state
            .ok_or_else(|| WorkerError::Internal("GetState returned no state".to_string()))?;
        Ok(AgentState {
            agent_id: state
                .agent_id
                .ok_or_else(|| WorkerError::Internal("missing agent_id".to_string()))?
                .try_into()?,
            etag: state.etag,
            payload: state.payload,
            type_url: state.type_url,
        })
    }

    pub async fn save_state(
        &self,
        agent_id: &agentmesh_wire::AgentId,
        payload: Vec<u8>,
        etag: String,
    ) -> Result<String, WorkerError> {
        let mut stub = self.stub.clone();
        let request = proto::AgentStateProto {
            agent_id: Some(agent_id.into()),
            etag,
            payload,
            type_url: None,
        };
        let response = stub
            .save_state(request)
            .await
            .map_err(|status| WorkerError::Unavailable(status.to_string()))?
            .into_inner();
        if !response.success {
            return Err(WorkerError::Internal("SaveState rejected (etag conflict)".to_string()));
        }
        Ok(response.new_etag)
    }
}

/// Connects to the gateway and drives the `OpenChannel` stream, reconnecting
/// with backoff on failure, forever (a worker with a dead gateway has no
/// other job to do).
///
/// `on_connected` receives the new `GatewayClient` handle each time a stream
/// is (re-)established — the dispatcher uses it to install the active
/// handle via `set_gateway`. `on_envelope` is invoked for every inbound
/// envelope and is expected to forward into the worker's main mailbox.
/// `on_disconnect` fires whenever the stream ends or fails to establish.
pub async fn run_connection<F>(
    config: WorkerConfig,
    mut on_connected: impl FnMut(GatewayClient) + Send,
    mut on_envelope: F,
    mut on_disconnect: impl FnMut(&str) + Send,
) -> !
where
    F: FnMut(Envelope) + Send,
{
    let mut backoff = ReconnectBackoff::new(config.reconnect_base_delay, config.reconnect_max_delay);

    loop {
        match connect_once(&config).await {
            Ok((client, mut inbound)) => {
                info!(addr = %config.gateway_addr, "connected to gateway");
                backoff.reset();
                on_connected(client);
                while let Some(envelope) = inbound.recv().await {
                    on_envelope(envelope);
                }
                warn!("gateway stream ended");
                on_disconnect("stream ended");
            }
            Err(err) => {
                error!(error = %err, "failed to connect to gateway");
                on_disconnect(&err.to_string());
            }
        }

        let delay = backoff.next_delay();
        tokio::time::sleep(delay).await;
    }
}

async fn connect_once(
    config: &WorkerConfig,
) -> Result<(GatewayClient, mpsc::UnboundedReceiver<Envelope>), WorkerError> {
    let channel = Channel::from_shared(config.gateway_addr.clone())
        .map_err(|e| WorkerError::InvalidArgument(e.to_string()))?
        .connect()
        .await
        .map_err(|e| WorkerError::Unavailable(e.to_string()))?;

    let mut stub = AgentMeshClient::new(channel);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<proto::Envelope>();
    let outbound_stream = UnboundedReceiverStream::new(outbound_rx);

    let mut response = stub
        .open_channel(outbound_stream)
        .await
        .map_err(|status| WorkerError::Unavailable(status.to_string()))?
        .into_inner();

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Envelope>();
    tokio::spawn(async move {
        while let Ok(Some(proto_envelope)) = response.message().await {
            match Envelope::try_from(proto_envelope) {
                Ok(envelope) => {
                    if inbound_tx.send(envelope).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "dropped malformed envelope from gateway");
                }
            }
        }
    });

    Ok((
        GatewayClient {
            outbound: outbound_tx,
            stub,
        },
        inbound_rx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn reset_returns_to_base_delay() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(50), Duration::from_secs(5));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }
}
