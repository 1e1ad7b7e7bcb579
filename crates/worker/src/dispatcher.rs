//! The dispatcher: the worker's single reader of the inbound `Envelope`
//! stream (§4.5), and the `RuntimeOps` implementation agent contexts call
//! back into.
//!
//! Mirrors the teacher's `ActorSystem` in shape — one task draining a
//! channel, looking up or spawning per-address workers, handing each
//! message to exactly one of them — generalized from a compile-time
//! `Actor<M,B>` to the runtime-typed `Agent`/`AgentFactory` pair (§9).

use std::collections::HashMap;
use std::sync::Arc;

use agentmesh_wire::envelope::{AddSubscriptionEnvelope, EventEnvelope, RequestEnvelope, ResponseEnvelope};
use agentmesh_wire::monitoring::Monitor;
use agentmesh_wire::{AgentId, AgentState, Envelope, Subscription, TopicId};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::activation::{ActivationHandle, ActivationInput, ActivationTable, UnknownAgentType};
use crate::agent::{AgentError, AgentMetadata, Cancellation, RuntimeOps, SendOutcome};
use crate::client::GatewayClient;
use crate::config::WorkerConfig;
use crate::events::WorkerEvent;
use crate::factory::AgentFactoryRegistry;
use crate::pending::ClientRequestTable;
use crate::subscriptions::LocalSubscriptions;

/// Ties together the activation table, factory registry, local subscription
/// mirror, and gateway client into the one object that drains the worker's
/// inbound stream and answers `RuntimeOps` calls from running agents.
///
/// Generic over the monitor type rather than `Arc<dyn Monitor<WorkerEvent>>`:
/// `Monitor` carries a `Clone` supertrait, which rules out a trait object.
pub struct Dispatcher<M: Monitor<WorkerEvent>> {
    config: WorkerConfig,
    activations: ActivationTable,
    factories: AgentFactoryRegistry,
    subscriptions: LocalSubscriptions,
    client_requests: ClientRequestTable,
    control_acks: Mutex<HashMap<String, oneshot::Sender<bool>>>,
    gateway: RwLock<Option<GatewayClient>>,
    monitor: M,
}

impl<M: Monitor<WorkerEvent> + 'static> Dispatcher<M> {
    pub fn new(config: WorkerConfig, factories: AgentFactoryRegistry, monitor: M) -> Arc<Self> {
        Arc::new(Self {
            config,
            activations: ActivationTable::new(),
            factories,
            subscriptions: LocalSubscriptions::new(),
            client_requests: ClientRequestTable::new(),
            control_acks: Mutex::new(HashMap::new()),
            gateway: RwLock::new(None),
            monitor,
        })
    }

    pub fn set_gateway(&self, client: Option<GatewayClient>) {
        *self.gateway.write() = client;
    }

    fn gateway(&self) -> Result<GatewayClient, AgentError> {
        self.gateway
            .read()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no active gateway connection"))
    }

    async fn record(&self, event: WorkerEvent) {
        if let Err(err) = self.monitor.record(event).await {
            warn!(error = %err, "failed to record worker event");
        }
    }

    /// Looks up a running activation for `agent_id`, spawning one via the
    /// registered factory on first reference (§4.5, §5 single-writer: only
    /// this method ever inserts into `activations`).
    async fn resolve_or_activate(
        self: &Arc<Self>,
        agent_id: &AgentId,
    ) -> Result<ActivationHandle, UnknownAgentType> {
        if let Some(handle) = self.activations.get(agent_id) {
            return Ok(handle);
        }
        let agent = self
            .factories
            .create(agent_id)
            .ok_or_else(|| UnknownAgentType(agent_id.agent_type().to_string()))?;
        let runtime: Arc<dyn RuntimeOps> = self.clone();
        let handle = crate::activation::spawn_activation(agent_id.clone(), agent, runtime);
        self.activations.insert(agent_id.clone(), handle.clone());
        self.record(WorkerEvent::AgentActivated {
            agent_id: agent_id.to_string(),
            at: now(),
        })
        .await;
        Ok(handle)
    }

    /// Drains the stream of envelopes the gateway connection hands up;
    /// returns when the stream (and therefore the channel) is exhausted.
    pub async fn run(self: Arc<Self>, mut inbound: tokio::sync::mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = inbound.recv().await {
            let this = Arc::clone(&self);
            match envelope {
                Envelope::ChannelOpened { connection_id } => {
                    debug!(%connection_id, "channel opened");
                    self.record(WorkerEvent::GatewayConnected { at: now() }).await;
                }
                Envelope::Request(request) => {
                    tokio::spawn(async move { this.handle_request(request).await });
                }
                Envelope::Event(event) => {
                    tokio::spawn(async move { this.handle_event(event).await });
                }
                Envelope::Response(response) => {
                    self.handle_response(response);
                }
                Envelope::AddSubscriptionResponse(ack) => {
                    self.complete_control_ack(&ack.request_id, ack.success);
                }
                Envelope::RegisterAgentTypeResponse(ack) => {
                    self.complete_control_ack(&ack.request_id, ack.success);
                }
                Envelope::RemoveSubscriptionResponse(ack) => {
                    self.complete_control_ack(&ack.request_id, ack.success);
                }
                other => {
                    warn!(envelope = ?other, "unexpected envelope kind on inbound stream");
                }
            }
        }
        debug!("inbound stream closed");
    }

    async fn handle_request(self: Arc<Self>, request: RequestEnvelope) {
        let handle = match self.resolve_or_activate(&request.target).await {
            Ok(handle) => handle,
            Err(err) => {
                self.reply_error(&request.request_id, err.to_string());
                return;
            }
        };

        let (tx, rx) = oneshot::channel();
        let enqueue_result = handle.enqueue(ActivationInput::Request {
            message_id: request.request_id.clone(),
            sender: Some(request.source.clone()),
            method: request.method.clone(),
            payload: request.payload.clone(),
            metadata: request.metadata.clone(),
            respond_to: tx,
        });
        if enqueue_result.is_err() {
            self.reply_error(&request.request_id, "activation mailbox closed".to_string());
            return;
        }

        let ok = match rx.await {
            Ok(Ok(payload)) => {
                self.reply_ok(&request.request_id, payload);
                true
            }
            Ok(Err(err)) => {
                self.reply_error(&request.request_id, err.to_string());
                false
            }
            Err(_) => {
                self.reply_error(&request.request_id, "activation dropped without responding".to_string());
                false
            }
        };
        self.record(WorkerEvent::RequestHandled {
            agent_id: request.target.to_string(),
            message_id: request.request_id,
            ok,
            at: now(),
        })
        .await;
    }

    async fn handle_event(self: Arc<Self>, event: EventEnvelope) {
        let matched_types = self.subscriptions.matches(event.topic.topic_type());
        if matched_types.is_empty() {
            return;
        }
        for agent_type in matched_types {
            let agent_id = match AgentId::new(agent_type, event.topic.source()) {
                Ok(id) => id,
                Err(err) => {
                    warn!(error = %err, "malformed local agent id for subscribed event");
                    continue;
                }
            };
            if event.source == agent_id.to_canonical() {
                continue;
            }
            let handle = match self.resolve_or_activate(&agent_id).await {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(%agent_id, error = %err, "dropping event for unknown agent type");
                    continue;
                }
            };
            let source = AgentId::from_canonical(&event.source).ok();
            let _ = handle.enqueue(ActivationInput::Event {
                message_id: event.id.clone(),
                sender: source,
                topic: event.topic.clone(),
                payload: event.payload.clone(),
                attributes: event.attributes.clone(),
            });
            self.record(WorkerEvent::EventHandled {
                agent_id: agent_id.to_string(),
                topic: event.topic.to_canonical(),
                at: now(),
            })
            .await;
        }
    }

    fn handle_response(&self, response: ResponseEnvelope) {
        let outcome: SendOutcome = match response.error {
            Some(err) => Err(err),
            None => Ok(response.payload.unwrap_or_default()),
        };
        if !self.client_requests.complete(&response.request_id, outcome) {
            warn!(request_id = %response.request_id, "response for unknown or already-completed request");
        }
    }

    fn complete_control_ack(&self, request_id: &str, success: bool) {
        let sender = self.control_acks.lock().remove(request_id);
        if let Some(sender) = sender {
            let _ = sender.send(success);
        }
    }

    fn reply_ok(&self, request_id: &str, payload: Option<Vec<u8>>) {
        self.reply(ResponseEnvelope {
            request_id: request_id.to_string(),
            payload,
            error: None,
            metadata: HashMap::new(),
        });
    }

    fn reply_error(&self, request_id: &str, error: String) {
        self.reply(ResponseEnvelope {
            request_id: request_id.to_string(),
            payload: None,
            error: Some(error),
            metadata: HashMap::new(),
        });
    }

    fn reply(&self, response: ResponseEnvelope) {
        if let Ok(gateway) = self.gateway() {
            if let Err(err) = gateway.send(Envelope::Response(response)) {
                warn!(error = %err, "failed to send response back to gateway");
            }
        }
    }

    /// Declares a subscription for a locally-registered agent type (§4.5);
    /// mirrors it locally and forwards it to the gateway's global index.
    pub async fn add_subscription(&self, subscription: Subscription) -> Result<(), AgentError> {
        self.subscriptions.add(&subscription);
        let gateway = self.gateway()?;
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.control_acks.lock().insert(request_id.clone(), tx);
        gateway.send(Envelope::AddSubscription(AddSubscriptionEnvelope {
            request_id,
            subscription,
        }))?;
        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(anyhow::anyhow!("gateway rejected subscription")),
            Ok(Err(_)) | Err(_) => Err(anyhow::anyhow!("subscription acknowledgement timed out")),
        }
    }
}

#[async_trait]
impl<M: Monitor<WorkerEvent> + 'static> RuntimeOps for Dispatcher<M> {
    async fn send_message(
        &self,
        payload: Vec<u8>,
        recipient: AgentId,
        sender: Option<AgentId>,
        message_id: Option<String>,
        mut cancellation: Cancellation,
    ) -> Result<SendOutcome, AgentError> {
        let request_id = message_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let gateway = self.gateway()?;
        let rx = self.client_requests.register(request_id.clone());

        let source = match sender {
            Some(id) => id,
            None => AgentId::new("worker", "anonymous")?,
        };
        gateway.send(Envelope::Request(RequestEnvelope {
            request_id: request_id.clone(),
            source,
            target: recipient,
            method: None,
            payload,
            metadata: HashMap::new(),
        }))?;

        tokio::select! {
            result = rx => match result {
                Ok(outcome) => Ok(outcome),
                Err(_) => Ok(Err("gateway connection lost while awaiting response".to_string())),
            },
            _ = tokio::time::sleep(self.config.request_timeout) => {
                self.client_requests.complete(&request_id, Err("deadline exceeded".to_string()));
                Ok(Err("deadline exceeded".to_string()))
            }
            _ = cancellation.cancelled() => {
                self.client_requests.remove(&request_id);
                Ok(Err("cancelled".to_string()))
            }
        }
    }

    async fn publish_message(
        &self,
        payload: Vec<u8>,
        topic: TopicId,
        sender: Option<AgentId>,
        message_id: Option<String>,
        attributes: HashMap<String, String>,
    ) -> Result<(), AgentError> {
        let gateway = self.gateway()?;
        let id = message_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let source = sender.map(|s| s.to_canonical()).unwrap_or_default();
        gateway.send(Envelope::Event(EventEnvelope {
            id,
            topic,
            source,
            payload,
            attributes,
        }))?;
        Ok(())
    }

    async fn save_state(&self, agent_id: &AgentId, payload: Vec<u8>, etag: String) -> Result<String, AgentError> {
        let gateway = self.gateway()?;
        gateway
            .save_state(agent_id, payload, etag)
            .await
            .map_err(|err| anyhow::anyhow!(err))
    }

    async fn load_state(&self, agent_id: &AgentId) -> Result<AgentState, AgentError> {
        let gateway = self.gateway()?;
        match gateway.get_state(agent_id).await {
            Ok(state) => Ok(state),
            Err(_) => Ok(AgentState::empty(agent_id.clone())),
        }
    }

    async fn get_agent_metadata(&self, agent_id: &AgentId) -> AgentMetadata {
        AgentMetadata {
            agent_id: agent_id.clone(),
            is_active_locally: self.activations.is_active(agent_id),
        }
    }
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentContext, AgentMessage, FnAgentFactory};
    use agentmesh_wire::monitoring::NoopMonitor;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn handle(
            &mut self,
            message: AgentMessage,
            _ctx: &mut AgentContext,
        ) -> Result<Option<Vec<u8>>, AgentError> {
            Ok(Some(message.payload().to_vec()))
        }
    }

    fn test_dispatcher() -> Arc<Dispatcher<NoopMonitor>> {
        let factories = AgentFactoryRegistry::new();
        factories.register("echo", Arc::new(FnAgentFactory(|_id: &AgentId| Box::new(Echo) as Box<dyn Agent>)));
        Dispatcher::new(WorkerConfig::default(), factories, NoopMonitor::default())
    }

    #[tokio::test]
    async fn unregistered_agent_type_is_reported() {
        let dispatcher = test_dispatcher();
        let id = AgentId::new("ghost", "x").unwrap();
        let err = dispatcher.resolve_or_activate(&id).await.unwrap_err();
        assert_eq!(err.0, "ghost");
    }

    #[tokio::test]
    async fn activation_is_reused_on_second_resolve() {
        let dispatcher = test_dispatcher();
        let id = AgentId::new("echo", "alice").unwrap();
        let first = dispatcher.resolve_or_activate(&id).await.unwrap();
        let second = dispatcher.resolve_or_activate(&id).await.unwrap();
        // Both handles enqueue into the same activation's inbox.
        let (tx, rx) = oneshot::channel();
        first
            .enqueue(ActivationInput::Request {
                message_id: "m1".to_string(),
                sender: None,
                method: None,
                payload: b"hi".to_vec(),
                metadata: HashMap::new(),
                respond_to: tx,
            })
            .unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), Some(b"hi".to_vec()));
        drop(second);
        assert_eq!(dispatcher.activations.len(), 1);
    }
}
