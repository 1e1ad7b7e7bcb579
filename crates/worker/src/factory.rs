//! `type -> factory` table (§4.5, §9 "Dynamic dispatch").

use std::sync::Arc;

use agentmesh_wire::AgentId;
use dashmap::DashMap;

use crate::agent::{Agent, AgentFactory};

/// Registered agent-type factories, keyed by the string type name a worker
/// declares via `RegisterAgentType`.
#[derive(Default)]
pub struct AgentFactoryRegistry {
    factories: DashMap<String, Arc<dyn AgentFactory>>,
}

impl AgentFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent_type: impl Into<String>, factory: Arc<dyn AgentFactory>) {
        self.factories.insert(agent_type.into(), factory);
    }

    pub fn create(&self, agent_id: &AgentId) -> Option<Box<dyn Agent>> {
        self.factories
            .get(agent_id.agent_type())
            .map(|f| f.create(agent_id))
    }

    pub fn is_registered(&self, agent_type: &str) -> bool {
        self.factories.contains_key(agent_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.factories.iter().map(|e| e.key().clone()).collect()
    }
}
