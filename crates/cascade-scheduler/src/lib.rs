//! Scheduling core for cascade: the task dependency graph, the shared
//! run context, the per-step executor, and the coordinator that drives a
//! whole run over a bounded worker pool.

pub mod context;
pub mod coordinator;
pub mod dag;
pub mod executor;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{RunContext, StatusRecord};
pub use coordinator::{Coordinator, RunOptions, RunReport};
pub use dag::TaskGraph;
pub use executor::{PollPolicy, StepExecutor};
