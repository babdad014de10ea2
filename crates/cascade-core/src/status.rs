//! Task and build status types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduler-side status of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Skipped,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Skipped | TaskStatus::Success | TaskStatus::Failure | TaskStatus::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }

    pub fn has_started(&self) -> bool {
        !matches!(self, TaskStatus::NotStarted)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "not started",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Wire status of a remote build, as reported by the backend.
///
/// `Unrecognized` absorbs status strings added to the API after this
/// enum was written; the executor treats them as unknown, never as
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    StatusUnknown,
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
    #[serde(other)]
    Unrecognized,
}

impl BuildStatus {
    /// Statuses the poller keeps waiting on. Anything else ends the poll.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            BuildStatus::StatusUnknown
                | BuildStatus::Pending
                | BuildStatus::Queued
                | BuildStatus::Working
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::StatusUnknown => "STATUS_UNKNOWN",
            BuildStatus::Pending => "PENDING",
            BuildStatus::Queued => "QUEUED",
            BuildStatus::Working => "WORKING",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failure => "FAILURE",
            BuildStatus::InternalError => "INTERNAL_ERROR",
            BuildStatus::Timeout => "TIMEOUT",
            BuildStatus::Cancelled => "CANCELLED",
            BuildStatus::Expired => "EXPIRED",
            BuildStatus::Unrecognized => "UNRECOGNIZED",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<BuildStatus> for TaskStatus {
    /// Collapse a terminal wire status into the scheduler's status domain.
    /// Everything that is not an unambiguous success or cancellation counts
    /// as a failure, so dependents stay blocked.
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Success => TaskStatus::Success,
            BuildStatus::Cancelled => TaskStatus::Cancelled,
            _ => TaskStatus::Failure,
        }
    }
}
