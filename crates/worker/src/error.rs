//! Worker error taxonomy (§7), mirroring the gateway's but scoped to
//! worker-local failures (unknown types, transport loss, closed channels).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no agent factory registered for type {0:?}")]
    AgentTypeNotFound(String),

    #[error("malformed identifier: {0}")]
    FormatError(#[from] agentmesh_wire::FormatError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("gateway connection unavailable: {0}")]
    Unavailable(String),

    #[error("response deadline exceeded for request {0:?}")]
    DeadlineExceeded(String),

    #[error("request {0:?} cancelled")]
    Cancelled(String),

    #[error("unexpected envelope kind on stream: {0}")]
    UnexpectedEnvelope(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::DeadlineExceeded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(WorkerError::Unavailable("no connection".to_string()).is_retryable());
        assert!(!WorkerError::InvalidArgument("bad".to_string()).is_retryable());
    }
}
