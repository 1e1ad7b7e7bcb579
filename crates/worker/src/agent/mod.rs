//! Agent behavior interface: the `Agent`/`AgentFactory` seam (§6.2, §9) and
//! the per-message `AgentContext`.

mod context;
mod traits;

pub use context::{AgentContext, Cancellation, CancellationTrigger, RuntimeOps, SendOutcome};
pub use traits::{Agent, AgentError, AgentFactory, AgentMessage, AgentMetadata, ErrorAction, FnAgentFactory};
