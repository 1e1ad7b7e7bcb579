//! `GatewayConfig`: plain struct + builder + env overrides (§6.4, §6.4.1).

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:7700";
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EVENT_BUFFER_HOLD_TIME: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_QUEUE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SELF_REGISTRATION_RETRY: Duration = Duration::from_secs(15);

/// Gateway-wide configuration (§6.4).
///
/// Mirrors the teacher's `SystemConfig`: a plain `Default`-implementing
/// struct with a companion builder that validates before handing back a
/// usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// `host:port` the gateway's `OpenChannel` service listens on.
    pub listen_addr: String,
    /// Deadline applied to every forwarded `Request` (§4.4).
    pub response_timeout: Duration,
    /// How long an unmatched `Event` sits in the `EventBuffer` before DLQ (§4.7).
    pub event_buffer_hold_time: Duration,
    /// Per-entry encoded-size cap for buffered/dead-lettered events.
    pub max_entry_bytes: usize,
    /// Per-queue (buffer or DLQ) total byte cap.
    pub max_queue_bytes: usize,
    /// Retry interval while the gateway cannot register itself as a worker handle at startup.
    pub self_registration_retry: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            event_buffer_hold_time: DEFAULT_EVENT_BUFFER_HOLD_TIME,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            max_queue_bytes: DEFAULT_MAX_QUEUE_BYTES,
            self_registration_retry: DEFAULT_SELF_REGISTRATION_RETRY,
        }
    }
}

impl GatewayConfig {
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.response_timeout.is_zero() {
            return Err("response_timeout must be > 0".to_string());
        }
        if self.max_entry_bytes == 0 || self.max_queue_bytes == 0 {
            return Err("size caps must be > 0".to_string());
        }
        if self.max_entry_bytes > self.max_queue_bytes {
            return Err("max_entry_bytes must not exceed max_queue_bytes".to_string());
        }
        Ok(())
    }

    /// Applies `AGENTMESH_GATEWAY_LISTEN` / `AGENTMESH_RESPONSE_TIMEOUT_MS` /
    /// `AGENTMESH_EVENT_BUFFER_HOLD_MS` env overrides on top of `self`, per §6.4.1.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("AGENTMESH_GATEWAY_LISTEN") {
            self.listen_addr = addr;
        }
        if let Ok(ms) = std::env::var("AGENTMESH_RESPONSE_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.response_timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(ms) = std::env::var("AGENTMESH_EVENT_BUFFER_HOLD_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.event_buffer_hold_time = Duration::from_millis(ms);
            }
        }
        self
    }
}

#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn event_buffer_hold_time(mut self, hold: Duration) -> Self {
        self.config.event_buffer_hold_time = hold;
        self
    }

    pub fn max_entry_bytes(mut self, bytes: usize) -> Self {
        self.config.max_entry_bytes = bytes;
        self
    }

    pub fn max_queue_bytes(mut self, bytes: usize) -> Self {
        self.config.max_queue_bytes = bytes;
        self
    }

    pub fn build(self) -> Result<GatewayConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let result = GatewayConfig::builder()
            .response_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_entry_larger_than_queue() {
        let result = GatewayConfig::builder()
            .max_entry_bytes(100)
            .max_queue_bytes(10)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_chains() {
        let config = GatewayConfig::builder()
            .listen_addr("127.0.0.1:9000")
            .response_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.response_timeout, Duration::from_secs(5));
    }
}
