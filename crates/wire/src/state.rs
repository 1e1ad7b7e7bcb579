//! Persisted per-agent state record (§6.3).

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// `(agentId, etag, payload)` persisted by the `AgentStateStore`.
///
/// `etag` is opaque; callers must supply the etag they last observed when
/// writing, and receive a fresh one back on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: AgentId,
    pub etag: String,
    pub payload: Vec<u8>,
    pub type_url: Option<String>,
}

impl AgentState {
    /// The empty state returned by `read()` for an agent with no persisted payload.
    pub fn empty(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            etag: String::new(),
            payload: Vec::new(),
            type_url: None,
        }
    }
}
