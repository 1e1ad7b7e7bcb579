//! `WorkerConfig`: connection target, timeouts, and mailbox sizing (§6.4).

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_GATEWAY_ADDR: &str = "http://127.0.0.1:7700";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1000;

/// Worker-wide configuration. Same plain-struct-plus-builder shape as
/// `agentmesh_gateway::GatewayConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// gRPC endpoint of the gateway's `OpenChannel` service.
    pub gateway_addr: String,
    /// Deadline this worker applies to its own outbound requests, mirroring
    /// the gateway's response timeout (§6.4).
    pub request_timeout: Duration,
    /// Initial delay before the first reconnect attempt after a stream error (§7).
    pub reconnect_base_delay: Duration,
    /// Cap on the exponential reconnect backoff.
    pub reconnect_max_delay: Duration,
    /// Per-agent bounded-mailbox capacity; `None` uses an unbounded mailbox.
    pub mailbox_capacity: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            gateway_addr: DEFAULT_GATEWAY_ADDR.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            mailbox_capacity: Some(DEFAULT_MAILBOX_CAPACITY),
        }
    }
}

impl WorkerConfig {
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.gateway_addr.is_empty() {
            return Err("gateway_addr must not be empty".to_string());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be > 0".to_string());
        }
        if self.reconnect_base_delay > self.reconnect_max_delay {
            return Err("reconnect_base_delay must not exceed reconnect_max_delay".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn gateway_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.gateway_addr = addr.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn mailbox_capacity(mut self, capacity: Option<usize>) -> Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<WorkerConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(WorkerConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_rejects_empty_addr() {
        assert!(WorkerConfig::builder().gateway_addr("").build().is_err());
    }

    #[test]
    fn builder_chains() {
        let config = WorkerConfig::builder()
            .gateway_addr("http://localhost:9000")
            .mailbox_capacity(None)
            .build()
            .unwrap();
        assert_eq!(config.gateway_addr, "http://localhost:9000");
        assert_eq!(config.mailbox_capacity, None);
    }
}
