//! Zero-overhead monitor for when observability is disabled.

use async_trait::async_trait;
use chrono::Utc;

use super::error::MonitoringError;
use super::traits::{Monitor, MonitoringEvent};
use super::types::MonitoringSnapshot;

/// A `Monitor` that discards every event; `snapshot` always reports zero counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

#[async_trait]
impl<E: MonitoringEvent> Monitor<E> for NoopMonitor {
    async fn record(&self, _event: E) -> Result<(), MonitoringError> {
        Ok(())
    }

    async fn snapshot(&self) -> Result<MonitoringSnapshot<E>, MonitoringError> {
        Ok(MonitoringSnapshot {
            timestamp: Utc::now(),
            total_events: 0,
            trace_count: 0,
            debug_count: 0,
            info_count: 0,
            warning_count: 0,
            error_count: 0,
            critical_count: 0,
            recent_events: Vec::new(),
        })
    }

    async fn reset(&self) -> Result<(), MonitoringError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::EventSeverity;
    use chrono::DateTime;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize)]
    struct TestEvent;

    impl MonitoringEvent for TestEvent {
        const EVENT_TYPE: &'static str = "test";

        fn timestamp(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn severity(&self) -> EventSeverity {
            EventSeverity::Info
        }
    }

    #[tokio::test]
    async fn noop_monitor_reports_nothing() {
        let monitor = NoopMonitor;
        monitor.record(TestEvent).await.unwrap();
        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.total_events, 0);
    }
}
