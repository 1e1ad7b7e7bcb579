//! `WorkerConnection` (§4.4): one gateway-side state machine per worker's
//! `OpenChannel` stream, `CONNECTING -> READY -> DRAINING -> CLOSED`.
//!
//! Mirrors the worker's `Dispatcher` in shape: one task draining an inbound
//! `Envelope` stream, dispatching by kind, replying through a `WorkerHandle`.
//! Generic over its monitor type for the same reason the worker side is:
//! `Monitor<E>: Clone` rules out `Arc<dyn Monitor<E>>`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use agentmesh_wire::monitoring::Monitor;
use agentmesh_wire::{
    AddSubscriptionEnvelope, Envelope, EventEnvelope, RegisterAgentTypeEnvelope, RemoveSubscriptionEnvelope,
    RequestEnvelope, ResponseEnvelope, Subscription, SubscriptionAckEnvelope,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::directory::{SharedDirectory, WorkerHandle};
use crate::error::GatewayError;
use crate::events::GatewayEvent;
use crate::message_registry::MessageRegistry;
use crate::pending::SharedPendingTable;
use crate::registry::{SharedRegistry, WorkerId};
use crate::state_store::SharedStateStore;
use crate::subscription_index::SharedSubscriptionIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Draining,
    Closed,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Ready,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// The set of shared, cluster-wide components every connection routes
/// through. Held by the tonic service and handed to each `WorkerConnection`
/// it spawns; nothing here is per-connection state.
pub struct GatewayShared<M: Monitor<GatewayEvent>> {
    pub registry: SharedRegistry,
    pub directory: SharedDirectory,
    pub pending: SharedPendingTable,
    pub subscriptions: SharedSubscriptionIndex,
    pub state_store: SharedStateStore,
    pub message_registry: Arc<MessageRegistry>,
    pub config: GatewayConfig,
    pub monitor: M,
}

/// Per-worker connection state, plus a local `request_id -> Subscription`
/// table: the wire protocol identifies a subscription for removal by the
/// `request_id` its `AddSubscription` was sent under, so that id is the
/// de-facto subscription handle (§4.4 leaves the exact identity scheme
/// unspecified; this is the resolution recorded in the design ledger).
pub struct WorkerConnection<M: Monitor<GatewayEvent>> {
    worker_id: WorkerId,
    state: AtomicU8,
    shared: Arc<GatewayShared<M>>,
    owned_subscriptions: DashMap<String, Subscription>,
}

impl<M: Monitor<GatewayEvent> + 'static> WorkerConnection<M> {
    pub fn new(worker_id: WorkerId, shared: Arc<GatewayShared<M>>) -> Arc<Self> {
        Arc::new(Self {
            worker_id,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            shared,
            owned_subscriptions: DashMap::new(),
        })
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    async fn record(&self, event: GatewayEvent) {
        if let Err(err) = self.shared.monitor.record(event).await {
            warn!(error = %err, "failed to record gateway event");
        }
    }

    /// Registers the connection, drains `inbound` until the stream ends,
    /// then tears down directory/registry/pending state for this worker.
    pub async fn run(self: Arc<Self>, outbound: mpsc::Sender<Envelope>, mut inbound: mpsc::Receiver<Envelope>) {
        self.shared.directory.insert(self.worker_id.clone(), WorkerHandle::new(outbound.clone()));
        self.shared.registry.add_worker(self.worker_id.clone());
        self.set_state(ConnectionState::Ready);
        self.record(GatewayEvent::WorkerConnected {
            worker_id: self.worker_id.to_string(),
            at: now(),
        })
        .await;

        if outbound
            .send(Envelope::ChannelOpened {
                connection_id: self.worker_id.as_str().to_string(),
            })
            .await
            .is_err()
        {
            warn!(worker_id = %self.worker_id, "failed to send ChannelOpened, closing connection");
            self.teardown().await;
            return;
        }

        while let Some(envelope) = inbound.recv().await {
            let this = Arc::clone(&self);
            match envelope {
                Envelope::ChannelOpened { .. } => {
                    warn!(worker_id = %self.worker_id, "worker sent ChannelOpened, ignoring");
                }
                Envelope::Request(request) => {
                    tokio::spawn(async move { this.handle_request(request).await });
                }
                Envelope::Response(response) => {
                    self.handle_response(response);
                }
                Envelope::Event(event) => {
                    tokio::spawn(async move { this.handle_event(event).await });
                }
                Envelope::AddSubscription(env) => {
                    tokio::spawn(async move { this.handle_add_subscription(env).await });
                }
                Envelope::RemoveSubscription(env) => {
                    self.handle_remove_subscription(env);
                }
                Envelope::RegisterAgentType(env) => {
                    tokio::spawn(async move { this.handle_register_agent_type(env).await });
                }
                other @ (Envelope::AddSubscriptionResponse(_)
                | Envelope::RemoveSubscriptionResponse(_)
                | Envelope::RegisterAgentTypeResponse(_)) => {
                    warn!(worker_id = %self.worker_id, envelope = ?other, "unexpected ack envelope from worker");
                }
            }
        }

        self.set_state(ConnectionState::Draining);
        self.teardown().await;
    }

    async fn teardown(&self) {
        let invalidated = self.shared.registry.remove_worker(&self.worker_id);
        self.shared.directory.remove(&self.worker_id);
        let pending_failed = self.shared.pending.fail_all_for_worker(&self.worker_id);
        for subscription in self.owned_subscriptions.iter() {
            self.shared.subscriptions.remove(subscription.value());
        }
        self.set_state(ConnectionState::Closed);
        self.record(GatewayEvent::WorkerDisconnected {
            worker_id: self.worker_id.to_string(),
            pending_failed,
            directory_entries_removed: invalidated.len(),
            at: now(),
        })
        .await;
    }

    /// Routes a `Request` per §4.4: place-or-resolve the target, rewrite the
    /// request id, forward to the target worker, and either relay its
    /// `Response` back once it arrives or fail on timeout.
    async fn handle_request(self: Arc<Self>, request: RequestEnvelope) {
        let (worker_opt, is_new) = self.shared.registry.get_or_place_agent(&request.target);
        let Some(target_worker) = worker_opt else {
            self.reply_error(
                &request.request_id,
                GatewayError::AgentTypeNotFound {
                    agent_type: request.target.agent_type().to_string(),
                },
            );
            return;
        };

        if is_new {
            self.record(GatewayEvent::AgentPlaced {
                agent_id: request.target.to_string(),
                worker_id: target_worker.to_string(),
                is_new,
                at: now(),
            })
            .await;
        }

        let Some(target_handle) = self.shared.directory.get(&target_worker) else {
            self.reply_error(
                &request.request_id,
                GatewayError::Unavailable {
                    agent_type: request.target.agent_type().to_string(),
                },
            );
            return;
        };

        let (rewritten_id, rx) = self.shared.pending.register(target_worker.clone(), request.request_id.clone(), self.worker_id.clone());
        let forwarded = RequestEnvelope {
            request_id: rewritten_id.clone(),
            ..request.clone()
        };

        if target_handle.send(Envelope::Request(forwarded)).await.is_err() {
            self.shared.pending.fail(
                &target_worker,
                &rewritten_id,
                GatewayError::Unavailable {
                    agent_type: request.target.agent_type().to_string(),
                },
            );
            self.reply_error(
                &request.request_id,
                GatewayError::Unavailable {
                    agent_type: request.target.agent_type().to_string(),
                },
            );
            return;
        }

        self.record(GatewayEvent::RequestRouted {
            request_id: request.request_id.clone(),
            target: request.target.to_string(),
            worker_id: target_worker.to_string(),
            at: now(),
        })
        .await;

        match tokio::time::timeout(self.shared.config.response_timeout, rx).await {
            Ok(Ok(Ok(response))) => self.reply(response),
            Ok(Ok(Err(err))) => self.reply_error(&request.request_id, err),
            Ok(Err(_)) => self.reply_error(&request.request_id, GatewayError::Internal("pending entry dropped without resolution".to_string())),
            Err(_) => {
                self.shared.pending.fail(
                    &target_worker,
                    &rewritten_id,
                    GatewayError::DeadlineExceeded {
                        request_id: request.request_id.clone(),
                    },
                );
                self.reply_error(
                    &request.request_id,
                    GatewayError::DeadlineExceeded {
                        request_id: request.request_id.clone(),
                    },
                );
                self.record(GatewayEvent::RequestFailed {
                    request_id: request.request_id.clone(),
                    reason: "response deadline exceeded".to_string(),
                    at: now(),
                })
                .await;
            }
        }
    }

    /// A `Response` from this connection's worker always answers a request
    /// that worker was asked to process; `request_id` here is the rewritten
    /// id the gateway minted when it forwarded the original `Request`.
    fn handle_response(&self, response: ResponseEnvelope) {
        if self.shared.pending.complete(&self.worker_id, &response.request_id, response).is_none() {
            warn!(worker_id = %self.worker_id, "response for unknown or already-completed request");
        }
    }

    /// Fans an `Event` out to every worker supporting a subscribed agent
    /// type (§4.3); an event matching no subscriber, or matching one with
    /// no connected worker, is buffered for possible late subscription
    /// (§4.7) rather than silently dropped.
    async fn handle_event(self: Arc<Self>, event: EventEnvelope) {
        let matched_types = self.shared.subscriptions.matches(event.topic.topic_type());
        if matched_types.is_empty() {
            self.shared.message_registry.buffer_unmatched(event.clone());
            return;
        }

        let mut workers = HashSet::new();
        for agent_type in &matched_types {
            workers.extend(self.shared.registry.workers_for_type(agent_type));
        }

        let mut delivered = 0usize;
        for worker in &workers {
            if let Some(handle) = self.shared.directory.get(worker) {
                if handle.try_send(Envelope::Event(event.clone())).is_ok() {
                    delivered += 1;
                }
            }
        }

        if delivered > 0 {
            self.record(GatewayEvent::EventFannedOut {
                event_id: event.id.clone(),
                topic: event.topic.to_canonical(),
                subscriber_count: delivered,
                at: now(),
            })
            .await;
        } else {
            self.shared.message_registry.buffer_unmatched(event.clone());
        }
    }

    async fn handle_add_subscription(self: Arc<Self>, env: AddSubscriptionEnvelope) {
        self.shared.subscriptions.add(&env.subscription);
        self.owned_subscriptions.insert(env.request_id.clone(), env.subscription.clone());

        let subscription = env.subscription.clone();
        let redelivered = self.shared.message_registry.take_matching(|topic_type| subscription.matches(topic_type));
        for event in redelivered {
            self.clone().handle_event(event).await;
        }

        self.ack(Envelope::AddSubscriptionResponse(SubscriptionAckEnvelope {
            request_id: env.request_id,
            success: true,
            error: None,
        }));
    }

    fn handle_remove_subscription(&self, env: RemoveSubscriptionEnvelope) {
        let success = match self.owned_subscriptions.remove(&env.subscription_id) {
            Some((_, subscription)) => {
                self.shared.subscriptions.remove(&subscription);
                true
            }
            None => false,
        };
        self.ack(Envelope::RemoveSubscriptionResponse(SubscriptionAckEnvelope {
            request_id: env.request_id,
            success,
            error: if success { None } else { Some("unknown subscription_id".to_string()) },
        }));
    }

    /// `topics` named at registration time are auto-subscribed as exact
    /// matches for this agent type, saving the worker a round trip for the
    /// common case of "subscribe to exactly what I register for". `events`
    /// (the types this agent type may publish) is recorded for symmetry
    /// with the wire schema but isn't yet consumed by routing.
    async fn handle_register_agent_type(self: Arc<Self>, env: RegisterAgentTypeEnvelope) {
        self.shared.registry.register_agent_type(&env.agent_type, self.worker_id.clone());

        for topic_type in &env.topics {
            let subscription = Subscription::TypeSubscription {
                topic_type: topic_type.clone(),
                agent_type: env.agent_type.clone(),
            };
            self.shared.subscriptions.add(&subscription);
            let synthetic_id = format!("register:{}:{}", env.request_id, Uuid::new_v4());
            self.owned_subscriptions.insert(synthetic_id, subscription.clone());

            let redelivered = self.shared.message_registry.take_matching(|t| t == topic_type.as_str());
            for event in redelivered {
                self.clone().handle_event(event).await;
            }
        }

        self.ack(Envelope::RegisterAgentTypeResponse(SubscriptionAckEnvelope {
            request_id: env.request_id,
            success: true,
            error: None,
        }));
    }

    fn reply(&self, response: ResponseEnvelope) {
        self.ack(Envelope::Response(response));
    }

    fn reply_error(&self, request_id: &str, err: GatewayError) {
        self.reply(ResponseEnvelope {
            request_id: request_id.to_string(),
            payload: None,
            error: Some(err.to_string()),
            metadata: Default::default(),
        });
    }

    /// Delivers an envelope back to this connection's own worker (a control
    /// ack, or a routed `Response`) without going through the pending table.
    fn ack(&self, envelope: Envelope) {
        if let Some(handle) = self.shared.directory.get(&self.worker_id) {
            if let Err(err) = handle.try_send(envelope) {
                warn!(worker_id = %self.worker_id, error = %err, "failed to deliver envelope to caller");
            }
        } else {
            debug!(worker_id = %self.worker_id, "no directory entry to reply on, connection already closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_wire::monitoring::NoopMonitor;
    use agentmesh_wire::AgentId;
    use std::time::Duration;

    fn shared() -> Arc<GatewayShared<NoopMonitor>> {
        Arc::new(GatewayShared {
            registry: Arc::new(crate::registry::RegistryGrain::new()),
            directory: Arc::new(crate::directory::WorkerDirectory::new()),
            pending: Arc::new(crate::pending::PendingRequestTable::new()),
            subscriptions: Arc::new(crate::subscription_index::SubscriptionIndex::new()),
            state_store: Arc::new(crate::state_store::InMemoryAgentStateStore::new()),
            message_registry: Arc::new(MessageRegistry::new(Duration::from_secs(5), 1024 * 1024, 1024 * 1024)),
            config: GatewayConfig::default(),
            monitor: NoopMonitor::default(),
        })
    }

    async fn spawn_worker(shared: Arc<GatewayShared<NoopMonitor>>, id: &str) -> (Arc<WorkerConnection<NoopMonitor>>, mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
        let worker_id = WorkerId::new(id);
        let connection = WorkerConnection::new(worker_id, shared);
        let (out_tx, out_rx) = mpsc::channel(32);
        let (in_tx, in_rx) = mpsc::channel(32);
        let run_connection = connection.clone();
        tokio::spawn(async move { run_connection.run(out_tx, in_rx).await });
        (connection, in_tx, out_rx)
    }

    #[tokio::test]
    async fn unplaced_request_errors_immediately() {
        let shared = shared();
        let (_conn, in_tx, mut out_rx) = spawn_worker(shared, "caller").await;

        // drain ChannelOpened
        out_rx.recv().await.unwrap();

        in_tx
            .send(Envelope::Request(RequestEnvelope {
                request_id: "r1".to_string(),
                source: AgentId::new("caller", "a").unwrap(),
                target: AgentId::new("ghost", "b").unwrap(),
                method: None,
                payload: vec![],
                metadata: Default::default(),
            }))
            .await
            .unwrap();

        let reply = out_rx.recv().await.unwrap();
        match reply {
            Envelope::Response(response) => {
                assert_eq!(response.request_id, "r1");
                assert!(response.error.is_some());
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_routes_and_response_relays_back() {
        let shared = shared();
        let (_caller, caller_tx, mut caller_rx) = spawn_worker(shared.clone(), "caller").await;
        caller_rx.recv().await.unwrap(); // ChannelOpened

        let (_target, target_tx, mut target_rx) = spawn_worker(shared.clone(), "target").await;
        target_rx.recv().await.unwrap(); // ChannelOpened

        shared.registry.register_agent_type("echo", WorkerId::new("target"));

        caller_tx
            .send(Envelope::Request(RequestEnvelope {
                request_id: "r1".to_string(),
                source: AgentId::new("caller", "a").unwrap(),
                target: AgentId::new("echo", "alice").unwrap(),
                method: None,
                payload: b"hi".to_vec(),
                metadata: Default::default(),
            }))
            .await
            .unwrap();

        let forwarded = target_rx.recv().await.unwrap();
        let rewritten_id = match forwarded {
            Envelope::Request(r) => {
                assert_ne!(r.request_id, "r1");
                r.request_id
            }
            other => panic!("expected Request, got {other:?}"),
        };

        target_tx
            .send(Envelope::Response(ResponseEnvelope {
                request_id: rewritten_id,
                payload: Some(b"hi".to_vec()),
                error: None,
                metadata: Default::default(),
            }))
            .await
            .unwrap();

        let reply = caller_rx.recv().await.unwrap();
        match reply {
            Envelope::Response(response) => {
                assert_eq!(response.request_id, "r1");
                assert_eq!(response.payload, Some(b"hi".to_vec()));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmatched_event_is_buffered_not_dropped() {
        let shared = shared();
        let (_conn, in_tx, mut out_rx) = spawn_worker(shared.clone(), "publisher").await;
        out_rx.recv().await.unwrap();

        in_tx
            .send(Envelope::Event(EventEnvelope {
                id: "e1".to_string(),
                topic: agentmesh_wire::TopicId::with_default_source("news").unwrap(),
                source: "publisher/agent".to_string(),
                payload: vec![1, 2, 3],
                attributes: Default::default(),
            }))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(shared.message_registry.buffer_len(), 1);
    }

    #[tokio::test]
    async fn disconnect_fails_pending_and_clears_directory() {
        let shared = shared();
        let worker_id = WorkerId::new("transient");
        let connection = WorkerConnection::new(worker_id.clone(), shared.clone());
        let (out_tx, out_rx) = mpsc::channel(32);
        let (in_tx, in_rx) = mpsc::channel(32);
        let handle = tokio::spawn({
            let connection = connection.clone();
            async move { connection.run(out_tx, in_rx).await }
        });
        drop(out_rx);

        shared.pending.register(worker_id.clone(), "orig".to_string(), WorkerId::new("caller"));
        drop(in_tx);
        handle.await.unwrap();

        assert!(!shared.directory.contains(&worker_id));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }
}
