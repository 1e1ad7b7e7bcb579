//! Mailbox metrics: a generic recorder trait plus a lock-free default impl.

mod atomic;
mod recorder;

pub use atomic::AtomicMetrics;
pub use recorder::MetricsRecorder;
