//! `WorkerEvent`: the concrete event type recorded through `Monitor<E>` (§10).

use agentmesh_wire::monitoring::{EventSeverity, MonitoringEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Activation, dispatch, and connection events this worker records.
#[derive(Debug, Clone, Serialize)]
pub enum WorkerEvent {
    AgentActivated {
        agent_id: String,
        at: DateTime<Utc>,
    },
    AgentClosed {
        agent_id: String,
        at: DateTime<Utc>,
    },
    RequestHandled {
        agent_id: String,
        message_id: String,
        ok: bool,
        at: DateTime<Utc>,
    },
    EventHandled {
        agent_id: String,
        topic: String,
        at: DateTime<Utc>,
    },
    GatewayConnected {
        at: DateTime<Utc>,
    },
    GatewayDisconnected {
        reason: String,
        at: DateTime<Utc>,
    },
    ReconnectScheduled {
        attempt: u32,
        delay_ms: u64,
        at: DateTime<Utc>,
    },
}

impl WorkerEvent {
    fn ts(&self) -> DateTime<Utc> {
        match self {
            Self::AgentActivated { at, .. }
            | Self::AgentClosed { at, .. }
            | Self::RequestHandled { at, .. }
            | Self::EventHandled { at, .. }
            | Self::GatewayConnected { at, .. }
            | Self::GatewayDisconnected { at, .. }
            | Self::ReconnectScheduled { at, .. } => *at,
        }
    }
}

impl MonitoringEvent for WorkerEvent {
    const EVENT_TYPE: &'static str = "worker_event";

    fn timestamp(&self) -> DateTime<Utc> {
        self.ts()
    }

    fn severity(&self) -> EventSeverity {
        match self {
            Self::AgentActivated { .. }
            | Self::AgentClosed { .. }
            | Self::EventHandled { .. }
            | Self::GatewayConnected { .. } => EventSeverity::Info,
            Self::RequestHandled { ok, .. } => {
                if *ok {
                    EventSeverity::Info
                } else {
                    EventSeverity::Error
                }
            }
            Self::GatewayDisconnected { .. } | Self::ReconnectScheduled { .. } => {
                EventSeverity::Warning
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_request_is_error_severity() {
        let event = WorkerEvent::RequestHandled {
            agent_id: "echo/alice".to_string(),
            message_id: "m1".to_string(),
            ok: false,
            at: Utc::now(),
        };
        assert_eq!(event.severity(), EventSeverity::Error);
    }
}
