//! Monitoring error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("failed to record event: {message}")]
    RecordError { message: String },

    #[error("failed to generate snapshot: {message}")]
    SnapshotError { message: String },

    #[error("failed to reset monitor: {message}")]
    ResetError { message: String },
}

impl MonitoringError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn record(message: impl Into<String>) -> Self {
        Self::RecordError {
            message: message.into(),
        }
    }

    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::SnapshotError {
            message: message.into(),
        }
    }

    pub fn reset(message: impl Into<String>) -> Self {
        Self::ResetError {
            message: message.into(),
        }
    }
}
