//! Worker-side pending-request table (§4.5): `requestId -> waiting caller`.
//!
//! Distinct from the gateway's `PendingRequestTable` (`agentmesh_gateway::pending`):
//! that one tracks requests the gateway forwarded to a worker and rewrites
//! ids for. This one tracks requests *this* worker's own agents issued via
//! `ctx.send_message`, correlated by the id the worker itself assigned.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::agent::SendOutcome;

/// `requestId -> completion` for outbound requests awaiting a `Response`
/// envelope on the shared stream back from the gateway.
#[derive(Default)]
pub struct ClientRequestTable {
    entries: Mutex<HashMap<String, oneshot::Sender<SendOutcome>>>,
}

impl ClientRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: String) -> oneshot::Receiver<SendOutcome> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(request_id, tx);
        rx
    }

    /// Completes the entry for `request_id`, if still pending. Returns
    /// `false` if the id is unknown (§4.5: "log a warning and drop").
    pub fn complete(&self, request_id: &str, outcome: SendOutcome) -> bool {
        let entry = self.entries.lock().remove(request_id);
        match entry {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drops the entry for `request_id` without resolving it — used when the
    /// caller's own cancellation fires first (§5): the waiting oneshot
    /// receiver observes the sender being dropped and the caller is
    /// answered with a `Cancelled` outcome directly, not through the channel.
    pub fn remove(&self, request_id: &str) -> bool {
        self.entries.lock().remove(request_id).is_some()
    }

    /// Fails every pending entry, e.g. on stream disconnect.
    pub fn fail_all(&self, reason: &str) {
        let mut entries = self.entries.lock();
        for (_, tx) in entries.drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
