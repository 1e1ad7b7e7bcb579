//! Generic event-monitoring infrastructure shared by the gateway and worker.
//!
//! The `Monitor<E>` trait is the in-process observability surface used by
//! both crates for their own domain events (`GatewayEvent`, `WorkerEvent`);
//! `tracing` is reserved for the process boundary (binaries), not for
//! routing-path instrumentation.

mod duration_serde;
mod error;
mod in_memory;
mod noop;
mod traits;
mod types;

pub use error::MonitoringError;
pub use in_memory::InMemoryMonitor;
pub use noop::NoopMonitor;
pub use traits::{EventSeverity, Monitor, MonitoringEvent};
pub use types::{MonitoringConfig, MonitoringSnapshot};
