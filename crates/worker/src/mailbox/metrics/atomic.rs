//! Lock-free atomic metrics recorder, the default for worker mailboxes.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::MetricsRecorder;

#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    last_message_at: RwLock<Option<DateTime<Utc>>>,
}

impl Clone for AtomicMetrics {
    fn clone(&self) -> Self {
        Self {
            messages_sent: AtomicU64::new(self.messages_sent.load(Ordering::Relaxed)),
            messages_received: AtomicU64::new(self.messages_received.load(Ordering::Relaxed)),
            messages_dropped: AtomicU64::new(self.messages_dropped.load(Ordering::Relaxed)),
            last_message_at: RwLock::new(*self.last_message_at.read()),
        }
    }
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsRecorder for AtomicMetrics {
    fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn update_last_message(&self, timestamp: DateTime<Utc>) {
        *self.last_message_at.write() = Some(timestamp);
    }

    fn sent_count(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    fn received_count(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    fn dropped_count(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    fn last_message_at(&self) -> Option<DateTime<Utc>> {
        *self.last_message_at.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_zero() {
        let metrics = AtomicMetrics::new();
        assert_eq!(metrics.sent_count(), 0);
        assert_eq!(metrics.received_count(), 0);
        assert_eq!(metrics.dropped_count(), 0);
        assert!(metrics.last_message_at().is_none());
    }

    #[test]
    fn in_flight_is_sent_minus_received() {
        let metrics = AtomicMetrics::new();
        for _ in 0..5 {
            metrics.record_sent();
        }
        for _ in 0..2 {
            metrics.record_received();
        }
        assert_eq!(metrics.in_flight(), 3);
    }

    #[test]
    fn in_flight_saturates_at_zero() {
        let metrics = AtomicMetrics::new();
        metrics.record_received();
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn concurrent_increments_are_consistent() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(AtomicMetrics::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_sent();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.sent_count(), 1000);
    }
}
