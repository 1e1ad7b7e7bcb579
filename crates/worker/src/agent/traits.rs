//! The `Agent` behavior interface and its factory (§6.2, §9 "Dynamic dispatch").
//!
//! Unlike the mailbox layer (generic over a compile-time `Message` type), agent
//! types are registered by runtime string (`RegisterAgentType`) and a single
//! worker process hosts many unrelated agent types side by side. There is no
//! way to monomorphize over "every agent type this worker will ever load", so
//! this layer is the one deliberate `dyn`-dispatch seam in the crate: an
//! `AgentFactory` produces `Box<dyn Agent>` from a string type name.

use std::collections::HashMap;

use agentmesh_wire::AgentId;
use async_trait::async_trait;

use super::context::AgentContext;

/// Error returned by an agent's handler or lifecycle hooks.
///
/// Agents are third-party, arbitrary code; there is no useful static error
/// type to demand of them, so the boundary is `anyhow::Error`, same as the
/// teacher's process-boundary error handling.
pub type AgentError = anyhow::Error;

/// The payload delivered to `Agent::handle`, distinguishing the two ways a
/// message can arrive per §4.5: as a point-to-point `Request` awaiting a
/// `Response`, or as a fan-out `Event` with no reply expected.
#[derive(Debug, Clone)]
pub enum AgentMessage {
    Request {
        method: Option<String>,
        payload: Vec<u8>,
        metadata: HashMap<String, String>,
    },
    Event {
        payload: Vec<u8>,
        attributes: HashMap<String, String>,
    },
}

impl AgentMessage {
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Request { payload, .. } => payload,
            Self::Event { payload, .. } => payload,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request { .. })
    }
}

/// A named unit of behavior, addressable by `AgentId`, that processes one
/// message at a time (§6.2).
///
/// `handle` returns `Ok(Some(bytes))` to answer an RPC, `Ok(None)` for an
/// event (or a request with no useful reply), and `Err` to fail the request
/// (propagated as `Response.error`) or, for events, to be logged and
/// swallowed (§7 "Published-event handler exceptions").
#[async_trait]
pub trait Agent: Send + Sync {
    async fn handle(
        &mut self,
        message: AgentMessage,
        ctx: &mut AgentContext,
    ) -> Result<Option<Vec<u8>>, AgentError>;

    /// Restores state read from the store at activation time.
    async fn load_state(&mut self, _state: Vec<u8>) {}

    /// Lifecycle hook invoked when the activation is torn down.
    async fn close(&mut self) {}

    /// Supervision decision for a `handle` failure (§4.5.1). Called after a
    /// `Request` handler returns `Err`; the default stops the activation,
    /// matching the teacher's `Actor::on_error` default.
    async fn on_error(&mut self, _error: &AgentError, _ctx: &mut AgentContext) -> ErrorAction {
        ErrorAction::Stop
    }
}

/// Supervision decision returned by `Agent::on_error` (§4.5.1), mirroring
/// the teacher's `ErrorAction` one level flat: agents here are keyed by
/// `(type,key)` with no parent/child nesting, so `Escalate` tears the
/// activation down rather than propagating to a supervisor tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorAction {
    /// Stop the activation permanently; no further messages are processed.
    #[default]
    Stop,
    /// Ignore the error and keep processing subsequent messages.
    Resume,
    /// Tear down and re-activate: reload persisted state via `pre_start`
    /// (here, a fresh `load_state` call) before the next message.
    Restart,
    /// Treat as unrecoverable: log and tear the activation down, same as
    /// `Stop` (no supervisor tree exists above a single activation here).
    Escalate,
}

/// Produces new `Agent` instances for one registered agent type.
///
/// One factory is registered per `agent_type` string (`worker: map<type,
/// factory>`, §4.5); `create` is called exactly once per activation, at
/// first reference to a given `(type, key)`.
pub trait AgentFactory: Send + Sync {
    fn create(&self, agent_id: &AgentId) -> Box<dyn Agent>;
}

/// Adapts any `Fn(&AgentId) -> Box<dyn Agent>` closure into an `AgentFactory`,
/// so simple agents don't need a dedicated factory type.
pub struct FnAgentFactory<F>(pub F)
where
    F: Fn(&AgentId) -> Box<dyn Agent> + Send + Sync;

impl<F> AgentFactory for FnAgentFactory<F>
where
    F: Fn(&AgentId) -> Box<dyn Agent> + Send + Sync,
{
    fn create(&self, agent_id: &AgentId) -> Box<dyn Agent> {
        (self.0)(agent_id)
    }
}

/// Metadata returned by `getAgentMetadata` (§6.2): whatever a caller can
/// learn about an agent without activating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMetadata {
    pub agent_id: AgentId,
    pub is_active_locally: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn fn_factory_adapts_closure() {
        let factory = FnAgentFactory(|_id: &AgentId| Box::new(Echo) as Box<dyn Agent>);
        let id = AgentId::new("echo", "alice").unwrap();
        let _agent = factory.create(&id);
    }

    #[test]
    fn agent_message_payload_accessor() {
        let msg = AgentMessage::Event {
            payload: b"hi".to_vec(),
            attributes: HashMap::new(),
        };
        assert_eq!(msg.payload(), b"hi");
        assert!(!msg.is_request());
    }
}
