//! Worker directory (§4.1): live connection handles keyed by `WorkerId`.
//!
//! The registry (`registry.rs`) decides *which* worker hosts an agent; this
//! module resolves a `WorkerId` to the live handle used to actually push an
//! envelope onto that worker's stream. Kept separate so a placement decision
//! never needs to hold the send-side lock.

use std::sync::Arc;

use agentmesh_wire::Envelope;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::registry::WorkerId;

/// Send handle for a single worker's `OpenChannel` stream.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<Envelope>,
}

impl WorkerHandle {
    pub fn new(sender: mpsc::Sender<Envelope>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, envelope: Envelope) -> Result<(), mpsc::error::SendError<Envelope>> {
        self.sender.send(envelope).await
    }

    pub fn try_send(&self, envelope: Envelope) -> Result<(), mpsc::error::TrySendError<Envelope>> {
        self.sender.try_send(envelope)
    }
}

/// Live `WorkerId -> WorkerHandle` table. A worker is present here for
/// exactly the lifetime of its `OpenChannel` stream.
#[derive(Debug, Default)]
pub struct WorkerDirectory {
    handles: DashMap<WorkerId, WorkerHandle>,
}

impl WorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, worker_id: WorkerId, handle: WorkerHandle) {
        self.handles.insert(worker_id, handle);
    }

    pub fn get(&self, worker_id: &WorkerId) -> Option<WorkerHandle> {
        self.handles.get(worker_id).map(|h| h.clone())
    }

    pub fn remove(&self, worker_id: &WorkerId) -> Option<WorkerHandle> {
        self.handles.remove(worker_id).map(|(_, h)| h)
    }

    pub fn contains(&self, worker_id: &WorkerId) -> bool {
        self.handles.contains_key(worker_id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

pub type SharedDirectory = Arc<WorkerDirectory>;
