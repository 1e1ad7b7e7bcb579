//! Gateway error taxonomy (§7) and its mapping onto gRPC status codes.

use thiserror::Error;

/// Errors raised by gateway-side operations.
///
/// One variant per taxonomy kind in §7; each carries the context a caller
/// needs without re-parsing a message string.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no worker supports agent type {agent_type:?}")]
    AgentTypeNotFound { agent_type: String },

    #[error("no state exists for agent {agent_id}")]
    StateNotFound { agent_id: String },

    #[error("no pending request for id {request_id:?}")]
    PendingRequestNotFound { request_id: String },

    #[error("etag mismatch on write to {agent_id}: expected {expected:?}, got {actual:?}")]
    Conflict {
        agent_id: String,
        expected: String,
        actual: String,
    },

    #[error("duplicate activation attempt for {0}")]
    DuplicateActivation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed identifier: {0}")]
    FormatError(#[from] agentmesh_wire::FormatError),

    #[error("no workers connected for agent type {agent_type:?}")]
    Unavailable { agent_type: String },

    #[error("response deadline exceeded for request {request_id:?}")]
    DeadlineExceeded { request_id: String },

    #[error("request {request_id:?} cancelled")]
    Cancelled { request_id: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AgentTypeNotFound { .. }
                | Self::StateNotFound { .. }
                | Self::PendingRequestNotFound { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::DeadlineExceeded { .. })
    }
}

impl From<GatewayError> for tonic::Status {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AgentTypeNotFound { .. }
            | GatewayError::StateNotFound { .. }
            | GatewayError::PendingRequestNotFound { .. } => {
                tonic::Status::not_found(err.to_string())
            }
            GatewayError::Conflict { .. } | GatewayError::DuplicateActivation(_) => {
                tonic::Status::already_exists(err.to_string())
            }
            GatewayError::InvalidArgument(_) | GatewayError::FormatError(_) => {
                tonic::Status::invalid_argument(err.to_string())
            }
            GatewayError::Unavailable { .. } => tonic::Status::unavailable(err.to_string()),
            GatewayError::DeadlineExceeded { .. } => {
                tonic::Status::deadline_exceeded(err.to_string())
            }
            GatewayError::Cancelled { .. } => tonic::Status::cancelled(err.to_string()),
            GatewayError::Internal(_) => tonic::Status::internal(err.to_string()),
        }
    }
}
