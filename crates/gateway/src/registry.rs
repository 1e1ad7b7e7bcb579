//! `RegistryGrain` (§4.2): cluster-global agent-type → workers map and placement.

use std::sync::Arc;

use agentmesh_wire::AgentId;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use rand::seq::IteratorRandom;

/// Opaque identifier for a worker connection, stable for the lifetime of its stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Placement {
    worker_id: WorkerId,
    placed_at: DateTime<Utc>,
}

/// Cluster-global map from agent type to the set of workers supporting it,
/// plus the current `(type,key) -> worker` placement table.
///
/// The in-process reference implementation uses `dashmap`, the same
/// lock-free concurrent map the teacher's `ActorRegistry` builds on,
/// because the contract only requires per-key serialization, not a single
/// global lock.
#[derive(Debug, Default)]
pub struct RegistryGrain {
    types: DashMap<String, DashSet<WorkerId>>,
    placements: DashMap<AgentId, Placement>,
    /// Least-recently-placed tie-break bookkeeping per worker.
    last_placed: DashMap<WorkerId, DateTime<Utc>>,
}

impl RegistryGrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: adding a worker already in the set is a no-op.
    pub fn register_agent_type(&self, agent_type: &str, worker: WorkerId) {
        self.types
            .entry(agent_type.to_string())
            .or_default()
            .insert(worker.clone());
        self.last_placed.entry(worker).or_insert_with(Utc::now);
    }

    pub fn unregister_agent_type(&self, agent_type: &str, worker: &WorkerId) {
        if let Some(set) = self.types.get(agent_type) {
            set.remove(worker);
        }
    }

    /// Registers a freshly connected worker with no supported types yet.
    pub fn add_worker(&self, worker: WorkerId) {
        self.last_placed.entry(worker).or_insert_with(Utc::now);
    }

    /// Removes a worker from every type set and every placement it held,
    /// returning the `AgentId`s whose placement was invalidated.
    pub fn remove_worker(&self, worker: &WorkerId) -> Vec<AgentId> {
        for entry in self.types.iter() {
            entry.value().remove(worker);
        }
        self.last_placed.remove(worker);

        let mut invalidated = Vec::new();
        self.placements.retain(|agent_id, placement| {
            if &placement.worker_id == worker {
                invalidated.push(agent_id.clone());
                false
            } else {
                true
            }
        });
        invalidated
    }

    /// Returns the worker currently hosting `agent_id`, placing it afresh if
    /// none exists. `uniform random, tie-broken by least-recently-placed` (§4.2).
    pub fn get_or_place_agent(&self, agent_id: &AgentId) -> (Option<WorkerId>, bool) {
        if let Some(placement) = self.placements.get(agent_id) {
            return (Some(placement.worker_id.clone()), false);
        }

        let Some(candidates) = self.types.get(agent_id.agent_type()) else {
            return (None, false);
        };
        if candidates.is_empty() {
            return (None, false);
        }

        let chosen = self.pick_worker(candidates.iter().map(|w| w.clone()));
        let Some(worker) = chosen else {
            return (None, false);
        };

        let now = Utc::now();
        self.last_placed.insert(worker.clone(), now);
        self.placements.insert(
            agent_id.clone(),
            Placement {
                worker_id: worker.clone(),
                placed_at: now,
            },
        );
        (Some(worker), true)
    }

    /// Uniform random is the primary selector (§4.2); least-recently-placed
    /// only tie-breaks when more than one candidate shares the same minimum
    /// `last_placed` timestamp.
    fn pick_worker(&self, candidates: impl Iterator<Item = WorkerId>) -> Option<WorkerId> {
        let candidates: Vec<WorkerId> = candidates.collect();
        if candidates.is_empty() {
            return None;
        }
        let placed_at = |w: &WorkerId| self.last_placed.get(w).map(|e| *e).unwrap_or_else(Utc::now);
        let oldest = candidates.iter().map(placed_at).min()?;
        let tied: Vec<WorkerId> = candidates.into_iter().filter(|w| placed_at(w) == oldest).collect();
        tied.into_iter().choose(&mut rand::thread_rng())
    }

    pub fn supports(&self, agent_type: &str) -> bool {
        self.types
            .get(agent_type)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    pub fn workers_for_type(&self, agent_type: &str) -> Vec<WorkerId> {
        self.types
            .get(agent_type)
            .map(|s| s.iter().map(|w| w.clone()).collect())
            .unwrap_or_default()
    }

    pub fn placement_count(&self) -> usize {
        self.placements.len()
    }
}

pub type SharedRegistry = Arc<RegistryGrain>;

#[cfg(test)]
mod tests {
    use super::*;

    fn aid(t: &str, k: &str) -> AgentId {
        AgentId::new(t, k).unwrap()
    }

    #[test]
    fn places_once_and_reuses() {
        let reg = RegistryGrain::new();
        reg.register_agent_type("echo", WorkerId::new("w1"));

        let (worker, is_new) = reg.get_or_place_agent(&aid("echo", "alice"));
        assert_eq!(worker, Some(WorkerId::new("w1")));
        assert!(is_new);

        let (worker2, is_new2) = reg.get_or_place_agent(&aid("echo", "alice"));
        assert_eq!(worker2, Some(WorkerId::new("w1")));
        assert!(!is_new2);
    }

    #[test]
    fn no_worker_supports_type() {
        let reg = RegistryGrain::new();
        let (worker, is_new) = reg.get_or_place_agent(&aid("ghost", "x"));
        assert_eq!(worker, None);
        assert!(!is_new);
    }

    #[test]
    fn disconnect_invalidates_placements_and_reenables_replacement() {
        let reg = RegistryGrain::new();
        reg.register_agent_type("slow", WorkerId::new("w1"));
        reg.register_agent_type("slow", WorkerId::new("w2"));

        let (worker, _) = reg.get_or_place_agent(&aid("slow", "instance"));
        let placed_on = worker.unwrap();

        let invalidated = reg.remove_worker(&placed_on);
        assert_eq!(invalidated, vec![aid("slow", "instance")]);

        let (worker2, is_new2) = reg.get_or_place_agent(&aid("slow", "instance"));
        assert!(is_new2);
        assert_ne!(worker2.unwrap(), placed_on);
    }

    #[test]
    fn register_agent_type_is_idempotent() {
        let reg = RegistryGrain::new();
        let w = WorkerId::new("w1");
        reg.register_agent_type("echo", w.clone());
        reg.register_agent_type("echo", w.clone());
        assert_eq!(reg.workers_for_type("echo").len(), 1);
    }

    #[test]
    fn unregister_removes_from_type_set_only() {
        let reg = RegistryGrain::new();
        let w = WorkerId::new("w1");
        reg.register_agent_type("echo", w.clone());
        reg.unregister_agent_type("echo", &w);
        assert!(!reg.supports("echo"));
    }
}
