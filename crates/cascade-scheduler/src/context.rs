//! Shared mutable state for one graph run.
//!
//! The graph owns the immutable topology; everything workers mutate while
//! a run is in flight lives here, behind a single exclusive lock. The
//! trigger cache is resolved once before dispatch and read without
//! locking.

use cascade_core::ports::TriggerHandle;
use cascade_core::revision::is_commit_sha;
use cascade_core::status::TaskStatus;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Recorded outcome of a task: its status and, once a remote build
/// exists, the build log URL.
#[derive(Debug, Clone, Default)]
pub struct StatusRecord {
    pub status: TaskStatus,
    pub log_url: Option<String>,
}

#[derive(Debug, Default)]
struct RunState {
    statuses: HashMap<String, StatusRecord>,
    pinned_ref: String,
}

/// Per-run context. Created at run start, dropped at run end; never
/// persisted.
pub struct RunContext {
    requested_ref: String,
    triggers: HashMap<String, TriggerHandle>,
    state: Mutex<RunState>,
}

impl RunContext {
    pub fn new(requested_ref: impl Into<String>, triggers: HashMap<String, TriggerHandle>) -> Self {
        Self {
            requested_ref: requested_ref.into(),
            triggers,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Look up a trigger handle by its `"{project_id}/{name}"` key.
    pub fn trigger(&self, full_name: &str) -> Option<&TriggerHandle> {
        self.triggers.get(full_name)
    }

    pub async fn record_status(&self, key: &str, status: TaskStatus, log_url: Option<String>) {
        let mut state = self.state.lock().await;
        debug!(task = key, %status, "recording status");
        state.statuses.insert(
            key.to_string(),
            StatusRecord { status, log_url },
        );
    }

    /// The recorded status of a task; unknown keys read as `NotStarted`
    /// with no log URL.
    pub async fn status(&self, key: &str) -> StatusRecord {
        let state = self.state.lock().await;
        state.statuses.get(key).cloned().unwrap_or_default()
    }

    /// A point-in-time copy of every recorded status, taken under one
    /// lock acquisition.
    pub async fn snapshot(&self) -> HashMap<String, TaskStatus> {
        let state = self.state.lock().await;
        state
            .statuses
            .iter()
            .map(|(key, record)| (key.clone(), record.status))
            .collect()
    }

    /// All records, for the end-of-run report.
    pub async fn records(&self) -> HashMap<String, StatusRecord> {
        let state = self.state.lock().await;
        state.statuses.clone()
    }

    /// Pin the run to a concrete revision the first time one becomes
    /// known. Candidates that are not commit-hash-shaped are ignored, and
    /// once a revision is pinned later calls are no-ops, so every step
    /// after the first resolved build uses the same exact commit.
    pub async fn pin_ref(&self, candidate: &str) {
        if !is_commit_sha(candidate) {
            return;
        }
        let mut state = self.state.lock().await;
        if !is_commit_sha(&state.pinned_ref) {
            debug!(revision = candidate, "pinning run revision");
            state.pinned_ref = candidate.to_string();
        }
    }

    /// The reference steps should build from: the pinned revision when
    /// one exists, otherwise the reference the run was asked for.
    pub async fn effective_ref(&self) -> String {
        let state = self.state.lock().await;
        if state.pinned_ref.is_empty() {
            self.requested_ref.clone()
        } else {
            state.pinned_ref.clone()
        }
    }
}
