//! `AgentStateStore` (§4.6): key/bytes persistence with optimistic ETag CAS.

use std::sync::Arc;

use agentmesh_wire::{AgentId, AgentState};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::GatewayError;

/// Storage contract for per-agent persisted state.
///
/// `write` is compare-and-swap keyed by etag: the caller must present the
/// etag it last read (or `""` for a never-written agent); a mismatch means
/// someone else wrote first and yields `GatewayError::Conflict`.
#[async_trait]
pub trait AgentStateStore: Send + Sync {
    async fn read(&self, agent_id: &AgentId) -> AgentState;

    async fn write(
        &self,
        agent_id: &AgentId,
        payload: Vec<u8>,
        expected_etag: &str,
        type_url: Option<String>,
    ) -> Result<String, GatewayError>;
}

/// Process-local `AgentStateStore` backed by a `DashMap`. Never durable
/// across restarts; a worker-backed implementation would swap this out
/// without touching call sites, since everything speaks through the trait.
#[derive(Debug, Default)]
pub struct InMemoryAgentStateStore {
    entries: DashMap<AgentId, AgentState>,
}

impl InMemoryAgentStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStateStore for InMemoryAgentStateStore {
    async fn read(&self, agent_id: &AgentId) -> AgentState {
        self.entries
            .get(agent_id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| AgentState::empty(agent_id.clone()))
    }

    async fn write(
        &self,
        agent_id: &AgentId,
        payload: Vec<u8>,
        expected_etag: &str,
        type_url: Option<String>,
    ) -> Result<String, GatewayError> {
        // `entry()` holds the shard lock for the whole read-compare-write so two
        // concurrent writers for the same agent can't both observe a matching
        // etag before either has inserted (§8 testable property #5).
        let mut slot = self.entries.entry(agent_id.clone()).or_insert_with(|| AgentState::empty(agent_id.clone()));

        if slot.etag != expected_etag {
            return Err(GatewayError::Conflict {
                agent_id: agent_id.to_canonical(),
                expected: expected_etag.to_string(),
                actual: slot.etag.clone(),
            });
        }

        let new_etag = Uuid::new_v4().to_string();
        *slot = AgentState {
            agent_id: agent_id.clone(),
            etag: new_etag.clone(),
            payload,
            type_url,
        };
        Ok(new_etag)
    }
}

pub type SharedStateStore = Arc<dyn AgentStateStore>;
