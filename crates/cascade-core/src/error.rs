//! Error types for cascade.

use crate::status::BuildStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Graph construction errors
    #[error("Task {0} is already present in the pipeline")]
    DuplicateTask(String),

    #[error("Task {task} depends on {dependency}, which is not part of the pipeline")]
    UnknownDependency { task: String, dependency: String },

    #[error("Cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    // Scheduler invariant violation
    #[error("Task {task} depends on {dependency}, but {dependency} hasn't finished yet")]
    InconsistentState { task: String, dependency: String },

    // Per-task execution errors
    #[error("No trigger matching {0} found")]
    TriggerNotFound(String),

    #[error("{0} cancelled by user")]
    UserCancelled(String),

    #[error("Failed to trigger {task}: {message}")]
    TriggerInvocation { task: String, message: String },

    #[error("Gave up polling build {build_id}: {message}")]
    PollExhausted { build_id: String, message: String },

    #[error("Build for {task} ended with status {status}")]
    BuildFailed { task: String, status: BuildStatus },

    #[error("Unknown build status {status} for {task}")]
    UnknownStatus { task: String, status: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Infrastructure errors
    #[error("Build backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether this error belongs to a single task rather than the run as
    /// a whole. Per-task errors are folded into scheduling decisions; the
    /// rest abort the run before or during dispatch.
    pub fn is_task_local(&self) -> bool {
        matches!(
            self,
            Error::TriggerNotFound(_)
                | Error::UserCancelled(_)
                | Error::TriggerInvocation { .. }
                | Error::PollExhausted { .. }
                | Error::BuildFailed { .. }
                | Error::UnknownStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
