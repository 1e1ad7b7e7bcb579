//! Per-agent mailbox: bounded/unbounded queues, backpressure, and metrics.

mod backpressure;
mod bounded;
pub mod metrics;
mod traits;
mod unbounded;

pub use backpressure::BackpressureStrategy;
pub use bounded::{BoundedMailbox, BoundedMailboxSender};
pub use traits::{MailboxCapacity, MailboxError, MailboxReceiver, MailboxSender, TryRecvError};
pub use unbounded::{UnboundedMailbox, UnboundedMailboxSender};
