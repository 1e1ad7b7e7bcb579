//! Core monitoring traits for universal event observation.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::MonitoringError;
use super::types::MonitoringSnapshot;

/// Event severity levels, ordered from lowest to highest for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EventSeverity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Events recordable through the `Monitor<E>` system.
pub trait MonitoringEvent: Send + Sync + Clone + Debug + Serialize + 'static {
    /// Static event type identifier for categorization.
    const EVENT_TYPE: &'static str;

    /// Timestamp when this event occurred, per the chrono `DateTime<Utc>` standard.
    fn timestamp(&self) -> DateTime<Utc>;

    fn severity(&self) -> EventSeverity;
}

/// Generic monitoring trait for observing and tracking events of type `E`.
///
/// Implementations range from zero-overhead no-op monitors to in-memory
/// monitors with bounded history. Generic over `E` rather than `dyn` so
/// the gateway and worker each get a monitor specialized to their own
/// concrete event enum at compile time.
#[async_trait]
pub trait Monitor<E: MonitoringEvent>: Send + Sync + Clone {
    async fn record(&self, event: E) -> Result<(), MonitoringError>;

    async fn snapshot(&self) -> Result<MonitoringSnapshot<E>, MonitoringError>;

    async fn reset(&self) -> Result<(), MonitoringError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct TestEvent {
        timestamp: DateTime<Utc>,
        severity: EventSeverity,
    }

    impl MonitoringEvent for TestEvent {
        const EVENT_TYPE: &'static str = "test_event";

        fn timestamp(&self) -> DateTime<Utc> {
            self.timestamp
        }

        fn severity(&self) -> EventSeverity {
            self.severity
        }
    }

    #[test]
    fn severity_ordering() {
        assert!(EventSeverity::Trace < EventSeverity::Debug);
        assert!(EventSeverity::Warning < EventSeverity::Error);
        assert!(EventSeverity::Error < EventSeverity::Critical);
    }

    #[test]
    fn event_exposes_timestamp_and_severity() {
        let now = Utc::now();
        let event = TestEvent {
            timestamp: now,
            severity: EventSeverity::Info,
        };
        assert_eq!(event.timestamp(), now);
        assert_eq!(event.severity(), EventSeverity::Info);
    }
}
