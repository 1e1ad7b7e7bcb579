//! Trait for recording mailbox send/receive/drop activity.

use chrono::{DateTime, Utc};

/// Abstracts the metrics backend a mailbox reports through.
pub trait MetricsRecorder: Send + Sync {
    fn record_sent(&self);

    fn record_received(&self);

    /// Backpressure drop or TTL expiry.
    fn record_dropped(&self);

    fn update_last_message(&self, timestamp: DateTime<Utc>);

    fn sent_count(&self) -> u64;

    fn received_count(&self) -> u64;

    fn dropped_count(&self) -> u64;

    fn last_message_at(&self) -> Option<DateTime<Utc>>;

    /// `sent_count - received_count`, saturating at zero.
    fn in_flight(&self) -> u64 {
        self.sent_count().saturating_sub(self.received_count())
    }
}
