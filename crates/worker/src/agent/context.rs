//! `AgentContext`: per-message metadata and the agent-to-runtime operations (§6.2).

use std::collections::HashMap;
use std::sync::Arc;

use agentmesh_wire::{AgentId, AgentState, TopicId};
use async_trait::async_trait;

use super::traits::{AgentError, AgentMetadata};

/// Cooperative cancellation signal threaded through a handler call.
///
/// Backed by a `tokio::sync::watch` rather than a dedicated cancellation
/// crate: whoever holds the matching `CancellationTrigger` flips it once and
/// every clone of this receiver observes it without extra wiring. Used today
/// on the outbound `send_message` path (§5), where `AgentContext::cancellation`
/// races a pending response. `activation.rs` constructs every inbound
/// `AgentContext` with `Cancellation::none()`, so an inbound handler's own
/// cancellation is not yet linked to anything (no deadline or disconnect
/// signal currently holds the trigger side for inbound dispatch).
#[derive(Debug, Clone)]
pub struct Cancellation {
    signal: tokio::sync::watch::Receiver<bool>,
}

impl Cancellation {
    pub fn new() -> (CancellationTrigger, Self) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (CancellationTrigger(tx), Self { signal: rx })
    }

    pub fn none() -> Self {
        Self::new().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once the signal is raised; a handler can `select!` on this
    /// alongside its own awaited work.
    pub async fn cancelled(&mut self) {
        let _ = self.signal.wait_for(|v| *v).await;
    }
}

/// The write side of a `Cancellation`, held by whoever owns the operation's
/// lifetime (the dispatcher for inbound requests, the caller for outbound ones).
#[derive(Debug, Clone)]
pub struct CancellationTrigger(tokio::sync::watch::Sender<bool>);

impl CancellationTrigger {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Result of an outbound `sendMessage` RPC: the callee's payload, or the
/// error string it (or the gateway) attached to the `Response`.
pub type SendOutcome = Result<Vec<u8>, String>;

/// Agent-to-runtime operations (§6.2): `sendMessage`, `publishMessage`,
/// `saveState`/`loadState`, `getAgentMetadata`.
///
/// Expressed as a `dyn` trait so `AgentContext` doesn't need to be generic
/// over the dispatcher's concrete type — the same dynamic-dispatch seam the
/// `Agent`/`AgentFactory` pair already uses (§9).
#[async_trait]
pub trait RuntimeOps: Send + Sync {
    async fn send_message(
        &self,
        payload: Vec<u8>,
        recipient: AgentId,
        sender: Option<AgentId>,
        message_id: Option<String>,
        cancellation: Cancellation,
    ) -> Result<SendOutcome, AgentError>;

    async fn publish_message(
        &self,
        payload: Vec<u8>,
        topic: TopicId,
        sender: Option<AgentId>,
        message_id: Option<String>,
        attributes: HashMap<String, String>,
    ) -> Result<(), AgentError>;

    async fn save_state(
        &self,
        agent_id: &AgentId,
        payload: Vec<u8>,
        etag: String,
    ) -> Result<String, AgentError>;

    async fn load_state(&self, agent_id: &AgentId) -> Result<AgentState, AgentError>;

    async fn get_agent_metadata(&self, agent_id: &AgentId) -> AgentMetadata;
}

/// Per-message context handed to `Agent::handle` (§6.2).
pub struct AgentContext {
    pub self_id: AgentId,
    pub message_id: String,
    pub cancellation: Cancellation,
    pub sender: Option<AgentId>,
    pub topic: Option<TopicId>,
    pub is_rpc: bool,
    runtime: Arc<dyn RuntimeOps>,
}

impl AgentContext {
    pub fn new(
        self_id: AgentId,
        message_id: String,
        cancellation: Cancellation,
        sender: Option<AgentId>,
        topic: Option<TopicId>,
        is_rpc: bool,
        runtime: Arc<dyn RuntimeOps>,
    ) -> Self {
        Self {
            self_id,
            message_id,
            cancellation,
            sender,
            topic,
            is_rpc,
            runtime,
        }
    }

    /// Issues an outbound `Request`, racing the response against this
    /// handler's own cancellation signal (§5): if `ctx.cancellation` fires
    /// before a `Response` arrives, the pending entry is cleared and the
    /// caller gets a `Cancelled` outcome rather than waiting out the full
    /// response timeout.
    pub async fn send_message(
        &self,
        payload: Vec<u8>,
        recipient: AgentId,
        message_id: Option<String>,
    ) -> Result<SendOutcome, AgentError> {
        self.runtime
            .send_message(payload, recipient, Some(self.self_id.clone()), message_id, self.cancellation.clone())
            .await
    }

    pub async fn publish_message(
        &self,
        payload: Vec<u8>,
        topic: TopicId,
        attributes: HashMap<String, String>,
    ) -> Result<(), AgentError> {
        self.runtime
            .publish_message(
                payload,
                topic,
                Some(self.self_id.clone()),
                None,
                attributes,
            )
            .await
    }

    pub async fn save_state(&self, payload: Vec<u8>, etag: String) -> Result<String, AgentError> {
        self.runtime.save_state(&self.self_id, payload, etag).await
    }

    pub async fn load_state(&self) -> Result<AgentState, AgentError> {
        self.runtime.load_state(&self.self_id).await
    }

    pub async fn get_agent_metadata(&self, agent_id: &AgentId) -> AgentMetadata {
        self.runtime.get_agent_metadata(agent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_starts_uncancelled() {
        let (_trigger, cancellation) = Cancellation::new();
        assert!(!cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn trigger_wakes_cancelled_waiters() {
        let (trigger, mut cancellation) = Cancellation::new();
        trigger.cancel();
        cancellation.cancelled().await;
        assert!(cancellation.is_cancelled());
    }

    #[test]
    fn none_is_never_cancelled() {
        assert!(!Cancellation::none().is_cancelled());
    }
}
