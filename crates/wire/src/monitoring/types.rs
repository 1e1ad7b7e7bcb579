//! Monitoring configuration and snapshot types, generic over the event type.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::traits::{EventSeverity, MonitoringEvent};

/// Controls how a `Monitor` records, filters, and retains events.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub max_history_size: usize,
    pub severity_filter: EventSeverity,
    #[serde(with = "super::duration_serde")]
    pub snapshot_interval: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history_size: 1000,
            severity_filter: EventSeverity::Info,
            snapshot_interval: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of a monitor's counters and recent event history.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringSnapshot<E: MonitoringEvent> {
    pub timestamp: DateTime<Utc>,
    pub total_events: u64,
    pub trace_count: u64,
    pub debug_count: u64,
    pub info_count: u64,
    pub warning_count: u64,
    pub error_count: u64,
    pub critical_count: u64,
    pub recent_events: Vec<E>,
}
