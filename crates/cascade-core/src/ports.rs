//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the scheduling core and
//! external adapters: the remote build backend and the user-facing
//! notifier. The scheduler only ever talks to these traits, so it can be
//! exercised with in-memory fakes.

use crate::Result;
use crate::revision::RevisionSelector;
use crate::status::BuildStatus;
use async_trait::async_trait;
use std::collections::HashMap;

/// A named remote build template, as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerHandle {
    pub id: String,
    pub name: String,
}

/// Handle to a build started by a trigger invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOperation {
    pub id: String,
    pub log_url: String,
    /// The concrete commit the backend resolved the revision selector to.
    pub commit_sha: String,
}

/// Remote build backend.
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// List the triggers of a project, keyed by `"{project_id}/{name}"`.
    async fn list_triggers(&self, project_id: &str) -> Result<HashMap<String, TriggerHandle>>;

    /// Start a build from a trigger at the given revision.
    async fn trigger_build(
        &self,
        project_id: &str,
        trigger_id: &str,
        revision: &RevisionSelector,
    ) -> Result<BuildOperation>;

    /// Current status of a build.
    async fn build_status(&self, project_id: &str, build_id: &str) -> Result<BuildStatus>;
}

/// Lifecycle phase carried by a step notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Started,
    Succeeded,
    Failed,
    Cancelled,
    Skipped,
}

/// A structured progress event for one task.
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub task: String,
    pub phase: StepPhase,
    pub message: String,
    pub log_url: Option<String>,
}

impl StepEvent {
    pub fn new(task: impl Into<String>, phase: StepPhase, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            phase,
            message: message.into(),
            log_url: None,
        }
    }

    pub fn with_log_url(mut self, log_url: impl Into<String>) -> Self {
        self.log_url = Some(log_url.into());
        self
    }
}

/// Sink for user-facing progress, plus the interactive confirmation
/// capability used by manual gates.
///
/// Implementations must serialize output so that events emitted by
/// concurrent workers do not interleave mid-line.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: StepEvent);

    /// Ask the user to confirm before a manual task proceeds. Returns
    /// `false` for anything but an affirmative answer.
    async fn confirm(&self, task: &str, message: &str, log_url: Option<&str>) -> bool;
}
