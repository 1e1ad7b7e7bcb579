//! Agent activation table (§4.5, §5): `(type,key) -> running agent task`.
//!
//! The dispatcher is the table's sole writer (it performs every insert before
//! handing a message off), so concurrent reads from agent tasks calling
//! `getAgentMetadata` are safe without extra locking beyond the `DashMap`
//! itself — matching the "Worker agent map: single-writer" rule in §5.

use std::collections::HashMap;
use std::sync::Arc;

use agentmesh_wire::{AgentId, TopicId};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::agent::{Agent, AgentContext, AgentError, AgentMessage, Cancellation, ErrorAction, RuntimeOps};

/// One unit of work delivered to an activated agent's task.
pub enum ActivationInput {
    Request {
        message_id: String,
        sender: Option<AgentId>,
        method: Option<String>,
        payload: Vec<u8>,
        metadata: HashMap<String, String>,
        respond_to: oneshot::Sender<Result<Option<Vec<u8>>, AgentError>>,
    },
    Event {
        message_id: String,
        sender: Option<AgentId>,
        topic: TopicId,
        payload: Vec<u8>,
        attributes: HashMap<String, String>,
    },
    Close,
}

/// Cheaply-cloneable handle to an activation's inbox.
#[derive(Clone)]
pub struct ActivationHandle {
    inbox: mpsc::UnboundedSender<ActivationInput>,
}

impl ActivationHandle {
    pub fn enqueue(&self, input: ActivationInput) -> Result<(), mpsc::error::SendError<ActivationInput>> {
        self.inbox.send(input)
    }
}

/// Spawns the per-agent task: read persisted state, then loop processing
/// `ActivationInput`s strictly in arrival order until `Close` or the inbox
/// is dropped (§4.5 "Activation").
pub fn spawn_activation(
    agent_id: AgentId,
    mut agent: Box<dyn Agent>,
    runtime: Arc<dyn RuntimeOps>,
) -> ActivationHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<ActivationInput>();

    tokio::spawn(async move {
        reload_state(&agent_id, agent.as_mut(), &runtime).await;

        'mailbox: while let Some(input) = rx.recv().await {
            match input {
                ActivationInput::Close => break,
                ActivationInput::Request {
                    message_id,
                    sender,
                    method,
                    payload,
                    metadata,
                    respond_to,
                } => {
                    let mut ctx = AgentContext::new(
                        agent_id.clone(),
                        message_id,
                        Cancellation::none(),
                        sender,
                        None,
                        true,
                        Arc::clone(&runtime),
                    );
                    let message = AgentMessage::Request {
                        method,
                        payload,
                        metadata,
                    };
                    let result = agent.handle(message, &mut ctx).await;
                    let action = match &result {
                        Ok(_) => ErrorAction::Resume,
                        Err(err) => {
                            warn!(%agent_id, error = %err, "request handler failed");
                            agent.on_error(err, &mut ctx).await
                        }
                    };
                    let _ = respond_to.send(result);
                    match action {
                        ErrorAction::Resume => {}
                        ErrorAction::Restart => reload_state(&agent_id, agent.as_mut(), &runtime).await,
                        ErrorAction::Stop | ErrorAction::Escalate => break 'mailbox,
                    }
                }
                ActivationInput::Event {
                    message_id,
                    sender,
                    topic,
                    payload,
                    attributes,
                } => {
                    let mut ctx = AgentContext::new(
                        agent_id.clone(),
                        message_id,
                        Cancellation::none(),
                        sender,
                        Some(topic),
                        false,
                        Arc::clone(&runtime),
                    );
                    let message = AgentMessage::Event { payload, attributes };
                    // §7: published-event handler exceptions are logged and swallowed,
                    // but still consulted for a supervision decision (§4.5.1).
                    if let Err(err) = agent.handle(message, &mut ctx).await {
                        warn!(%agent_id, error = %err, "event handler failed");
                        match agent.on_error(&err, &mut ctx).await {
                            ErrorAction::Resume => {}
                            ErrorAction::Restart => reload_state(&agent_id, agent.as_mut(), &runtime).await,
                            ErrorAction::Stop | ErrorAction::Escalate => break 'mailbox,
                        }
                    }
                }
            }
        }

        debug!(%agent_id, "activation closed");
        agent.close().await;
    });

    ActivationHandle { inbox: tx }
}

/// Reloads persisted state into `agent`, used both at first activation and
/// on an `ErrorAction::Restart` supervision decision (§4.5.1).
async fn reload_state(agent_id: &AgentId, agent: &mut dyn Agent, runtime: &Arc<dyn RuntimeOps>) {
    match runtime.load_state(agent_id).await {
        Ok(state) if !state.payload.is_empty() => agent.load_state(state.payload).await,
        Ok(_) => {}
        Err(err) => warn!(%agent_id, error = %err, "failed to load persisted state at activation"),
    }
}

/// Error raised when no factory is registered for an `AgentId`'s type.
#[derive(Debug, thiserror::Error)]
#[error("no agent factory registered for type {0:?}")]
pub struct UnknownAgentType(pub String);

/// `(type,key) -> ActivationHandle` table, populated lazily on first reference.
#[derive(Default)]
pub struct ActivationTable {
    activations: DashMap<AgentId, ActivationHandle>,
}

impl ActivationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<ActivationHandle> {
        self.activations.get(agent_id).map(|h| h.clone())
    }

    /// Inserts a freshly spawned activation. Only the dispatcher calls this,
    /// after confirming `get` returned `None` (§5 single-writer).
    pub fn insert(&self, agent_id: AgentId, handle: ActivationHandle) {
        self.activations.insert(agent_id, handle);
    }

    pub fn remove(&self, agent_id: &AgentId) -> Option<ActivationHandle> {
        self.activations.remove(agent_id).map(|(_, h)| h)
    }

    pub fn is_active(&self, agent_id: &AgentId) -> bool {
        self.activations.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.activations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }
}
