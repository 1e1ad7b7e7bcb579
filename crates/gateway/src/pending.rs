//! Pending-request table (§4.4): RequestId rewriting and response correlation.

use std::sync::Arc;

use agentmesh_wire::ResponseEnvelope;
use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::registry::WorkerId;

/// Key under which a forwarded Request is tracked: the worker it was sent to
/// plus the fresh id the gateway assigned it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub worker_id: WorkerId,
    pub rewritten_request_id: String,
}

struct PendingEntry {
    original_request_id: String,
    caller_connection: WorkerId,
    completion: oneshot::Sender<Result<ResponseEnvelope, GatewayError>>,
}

/// `(worker, rewrittenRequestId) -> (originalRequestId, callerConnection, promise)`.
///
/// The gateway is the only component that rewrites ids, so a worker's
/// original request id never needs to cross a second stream boundary.
#[derive(Default)]
pub struct PendingRequestTable {
    entries: DashMap<PendingKey, PendingEntry>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a forwarded Request, returning the fresh id to put on the wire
    /// and a receiver that resolves when a matching Response arrives, the
    /// entry is failed, or it is dropped without resolution (deadline expiry,
    /// handled by the caller wrapping this receiver in a timeout).
    pub fn register(
        &self,
        worker_id: WorkerId,
        original_request_id: String,
        caller_connection: WorkerId,
    ) -> (String, oneshot::Receiver<Result<ResponseEnvelope, GatewayError>>) {
        let rewritten = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            PendingKey {
                worker_id,
                rewritten_request_id: rewritten.clone(),
            },
            PendingEntry {
                original_request_id,
                caller_connection,
                completion: tx,
            },
        );
        (rewritten, rx)
    }

    /// Completes a pending entry with the Response that just arrived from
    /// `worker_id`, restoring the original request id the caller expects.
    /// Returns the caller connection so the gateway knows where to deliver it.
    pub fn complete(
        &self,
        worker_id: &WorkerId,
        rewritten_request_id: &str,
        mut response: ResponseEnvelope,
    ) -> Option<WorkerId> {
        let key = PendingKey {
            worker_id: worker_id.clone(),
            rewritten_request_id: rewritten_request_id.to_string(),
        };
        let (_, entry) = self.entries.remove(&key)?;
        response.request_id = entry.original_request_id;
        let caller = entry.caller_connection.clone();
        let _ = entry.completion.send(Ok(response));
        Some(caller)
    }

    /// Explicitly fails one pending entry (deadline expiry, cancellation).
    pub fn fail(&self, worker_id: &WorkerId, rewritten_request_id: &str, err: GatewayError) {
        let key = PendingKey {
            worker_id: worker_id.clone(),
            rewritten_request_id: rewritten_request_id.to_string(),
        };
        if let Some((_, entry)) = self.entries.remove(&key) {
            let _ = entry.completion.send(Err(err));
        }
    }

    /// Fails every pending entry owned by `worker_id`, e.g. on disconnect.
    /// Returns the count failed.
    pub fn fail_all_for_worker(&self, worker_id: &WorkerId) -> usize {
        let keys: Vec<PendingKey> = self
            .entries
            .iter()
            .filter(|e| &e.key().worker_id == worker_id)
            .map(|e| e.key().clone())
            .collect();
        let count = keys.len();
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                let _ = entry
                    .completion
                    .send(Err(GatewayError::Internal("worker disconnected".to_string())));
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type SharedPendingTable = Arc<PendingRequestTable>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response(request_id: &str) -> ResponseEnvelope {
        ResponseEnvelope {
            request_id: request_id.to_string(),
            payload: None,
            error: None,
            metadata: std::collections::HashMap::new(),
        }
    }

    #[tokio::test]
    async fn register_and_complete_restores_original_id() {
        let table = PendingRequestTable::new();
        let worker = WorkerId::new("w1");
        let caller = WorkerId::new("w2");
        let (rewritten, rx) = table.register(worker.clone(), "orig-1".to_string(), caller.clone());

        let restored_to = table
            .complete(&worker, &rewritten, response(&rewritten))
            .expect("entry existed");
        assert_eq!(restored_to, caller);

        let resolved = rx.await.expect("not dropped").expect("ok");
        assert_eq!(resolved.request_id, "orig-1");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn complete_unknown_key_is_none() {
        let table = PendingRequestTable::new();
        let result = table.complete(&WorkerId::new("ghost"), "nope", response("nope"));
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fail_all_for_worker_resolves_with_error() {
        let table = PendingRequestTable::new();
        let worker = WorkerId::new("w1");
        let (_id1, rx1) = table.register(worker.clone(), "o1".to_string(), WorkerId::new("c1"));
        let (_id2, rx2) = table.register(worker.clone(), "o2".to_string(), WorkerId::new("c2"));
        table.register(WorkerId::new("w2"), "o3".to_string(), WorkerId::new("c3"));

        let failed = table.fail_all_for_worker(&worker);
        assert_eq!(failed, 2);
        assert!(rx1.await.expect("not dropped").is_err());
        assert!(rx2.await.expect("not dropped").is_err());
        assert_eq!(table.len(), 1);
    }
}
