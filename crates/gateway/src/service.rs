//! tonic `AgentMesh` service (§6.1): wires a fresh `WorkerConnection` to
//! every accepted `OpenChannel` stream, and answers the unary
//! `GetState`/`SaveState`/`AddSubscription`/`RegisterAgent` RPCs directly
//! against the shared state store, subscription index, and registry.

use std::pin::Pin;
use std::sync::Arc;

use agentmesh_wire::monitoring::Monitor;
use agentmesh_wire::proto::agent_mesh_server::AgentMesh;
use agentmesh_wire::{proto, AgentId, Envelope, FormatError};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};
use uuid::Uuid;

use crate::connection::{GatewayShared, WorkerConnection};
use crate::events::GatewayEvent;
use crate::registry::WorkerId;

const STREAM_CHANNEL_DEPTH: usize = 256;

fn invalid_argument(err: FormatError) -> Status {
    Status::invalid_argument(err.to_string())
}

pub struct AgentMeshService<M: Monitor<GatewayEvent>> {
    shared: Arc<GatewayShared<M>>,
}

impl<M: Monitor<GatewayEvent> + 'static> AgentMeshService<M> {
    pub fn new(shared: Arc<GatewayShared<M>>) -> Self {
        Self { shared }
    }
}

#[tonic::async_trait]
impl<M: Monitor<GatewayEvent> + 'static> AgentMesh for AgentMeshService<M> {
    type OpenChannelStream = Pin<Box<dyn Stream<Item = Result<proto::Envelope, Status>> + Send + 'static>>;

    /// Accepts a worker's stream, assigns it a fresh `WorkerId`, and spawns
    /// a `WorkerConnection` to own its lifetime — this method's only job is
    /// plumbing proto bytes to/from the domain-typed channels the
    /// connection actually works with.
    async fn open_channel(&self, request: Request<Streaming<proto::Envelope>>) -> Result<Response<Self::OpenChannelStream>, Status> {
        let worker_id = WorkerId::new(Uuid::new_v4().to_string());
        info!(%worker_id, "worker opened channel");

        let mut inbound_proto = request.into_inner();
        let (domain_in_tx, domain_in_rx) = mpsc::channel::<Envelope>(STREAM_CHANNEL_DEPTH);
        tokio::spawn(async move {
            loop {
                match inbound_proto.message().await {
                    Ok(Some(proto_envelope)) => match Envelope::try_from(proto_envelope) {
                        Ok(envelope) => {
                            if domain_in_tx.send(envelope).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "dropped malformed envelope from worker"),
                    },
                    Ok(None) => break,
                    Err(status) => {
                        warn!(error = %status, "inbound stream error, closing");
                        break;
                    }
                }
            }
        });

        let (domain_out_tx, mut domain_out_rx) = mpsc::channel::<Envelope>(STREAM_CHANNEL_DEPTH);
        let connection = WorkerConnection::new(worker_id, self.shared.clone());
        tokio::spawn(async move { connection.run(domain_out_tx, domain_in_rx).await });

        let (proto_out_tx, proto_out_rx) = mpsc::channel::<Result<proto::Envelope, Status>>(STREAM_CHANNEL_DEPTH);
        tokio::spawn(async move {
            while let Some(envelope) = domain_out_rx.recv().await {
                if proto_out_tx.send(Ok(envelope.into())).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(proto_out_rx))))
    }

    async fn get_state(&self, request: Request<proto::AgentIdProto>) -> Result<Response<proto::AgentStateResponse>, Status> {
        let agent_id: AgentId = request.into_inner().try_into().map_err(invalid_argument)?;
        let state = self.shared.state_store.read(&agent_id).await;
        Ok(Response::new(proto::AgentStateResponse {
            state: Some(proto::AgentStateProto {
                agent_id: Some((&state.agent_id).into()),
                etag: state.etag,
                payload: state.payload,
                type_url: state.type_url,
            }),
        }))
    }

    /// CAS failure is reported as `success: false` rather than an RPC
    /// error: an etag conflict is an expected outcome a caller checks for,
    /// not an exceptional transport failure.
    async fn save_state(&self, request: Request<proto::AgentStateProto>) -> Result<Response<proto::SaveResponse>, Status> {
        let proto_state = request.into_inner();
        let agent_id: AgentId = proto_state
            .agent_id
            .ok_or_else(|| Status::invalid_argument("missing agent_id"))?
            .try_into()
            .map_err(invalid_argument)?;

        let outcome = self
            .shared
            .state_store
            .write(&agent_id, proto_state.payload, &proto_state.etag, proto_state.type_url)
            .await;

        match outcome {
            Ok(new_etag) => Ok(Response::new(proto::SaveResponse { success: true, new_etag })),
            Err(_conflict) => Ok(Response::new(proto::SaveResponse {
                success: false,
                new_etag: String::new(),
            })),
        }
    }

    /// Mutates the cluster-global subscription index directly. Unlike the
    /// stream-carried `AddSubscription`, this call isn't tied to a
    /// `WorkerConnection`, so a subscription added this way isn't cleaned
    /// up on any particular worker's disconnect — it's meant for
    /// bootstrap-time registration ahead of a worker's first `OpenChannel`.
    async fn add_subscription(
        &self,
        request: Request<proto::AddSubscriptionProto>,
    ) -> Result<Response<proto::AddSubscriptionResponseProto>, Status> {
        let req = request.into_inner();
        let subscription = req
            .subscription
            .ok_or_else(|| Status::invalid_argument("missing subscription"))?
            .try_into()
            .map_err(invalid_argument)?;

        self.shared.subscriptions.add(&subscription);
        Ok(Response::new(proto::AddSubscriptionResponseProto {
            request_id: req.request_id,
            success: true,
            error: None,
        }))
    }

    /// Placement requires a live directory entry to route to, which only
    /// exists for the lifetime of an `OpenChannel` stream — so agent-type
    /// registration outside that stream has nothing to attach to and is
    /// rejected rather than silently accepted and never routable.
    async fn register_agent(
        &self,
        _request: Request<proto::RegisterAgentTypeProto>,
    ) -> Result<Response<proto::RegisterAgentTypeResponseProto>, Status> {
        Err(Status::failed_precondition(
            "RegisterAgentType must be sent over an open OpenChannel stream, not the unary RPC",
        ))
    }
}
