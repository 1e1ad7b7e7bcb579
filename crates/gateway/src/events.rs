//! `GatewayEvent`: the concrete event type recorded through `Monitor<E>` (§10).

use agentmesh_wire::monitoring::{EventSeverity, MonitoringEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connection lifecycle, placement, routing, and dead-letter events the
/// gateway records through its `Monitor<GatewayEvent>`.
#[derive(Debug, Clone, Serialize)]
pub enum GatewayEvent {
    WorkerConnected {
        worker_id: String,
        at: DateTime<Utc>,
    },
    WorkerDisconnected {
        worker_id: String,
        pending_failed: usize,
        directory_entries_removed: usize,
        at: DateTime<Utc>,
    },
    AgentPlaced {
        agent_id: String,
        worker_id: String,
        is_new: bool,
        at: DateTime<Utc>,
    },
    RequestRouted {
        request_id: String,
        target: String,
        worker_id: String,
        at: DateTime<Utc>,
    },
    RequestFailed {
        request_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    EventFannedOut {
        event_id: String,
        topic: String,
        subscriber_count: usize,
        at: DateTime<Utc>,
    },
    EventDeadLettered {
        event_id: String,
        topic: String,
        at: DateTime<Utc>,
    },
}

impl GatewayEvent {
    fn ts(&self) -> DateTime<Utc> {
        match self {
            Self::WorkerConnected { at, .. }
            | Self::WorkerDisconnected { at, .. }
            | Self::AgentPlaced { at, .. }
            | Self::RequestRouted { at, .. }
            | Self::RequestFailed { at, .. }
            | Self::EventFannedOut { at, .. }
            | Self::EventDeadLettered { at, .. } => *at,
        }
    }
}

impl MonitoringEvent for GatewayEvent {
    const EVENT_TYPE: &'static str = "gateway_event";

    fn timestamp(&self) -> DateTime<Utc> {
        self.ts()
    }

    fn severity(&self) -> EventSeverity {
        match self {
            Self::WorkerConnected { .. } | Self::AgentPlaced { .. } | Self::RequestRouted { .. } => {
                EventSeverity::Info
            }
            Self::EventFannedOut { .. } => EventSeverity::Debug,
            Self::WorkerDisconnected { .. } | Self::EventDeadLettered { .. } => {
                EventSeverity::Warning
            }
            Self::RequestFailed { .. } => EventSeverity::Error,
        }
    }
}
