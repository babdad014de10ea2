//! Per-step execution.
//!
//! One executor invocation drives a single task through its lifecycle:
//! manual gate, trigger invocation, bounded-retry status polling, and the
//! final status commit into the run context. The coordinator records the
//! task as `Running` when it dispatches the job; every return path below
//! leaves a terminal status behind.

use crate::context::RunContext;
use cascade_core::pipeline::TaskSpec;
use cascade_core::ports::{BuildBackend, Notifier, StepEvent, StepPhase};
use cascade_core::revision::RevisionSelector;
use cascade_core::status::{BuildStatus, TaskStatus};
use cascade_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How build status is polled: a fixed interval between queries, and a
/// small budget of transient backend errors tolerated before giving up.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            retries: 3,
        }
    }
}

/// Executes single tasks against the build backend. Cheap to clone; one
/// instance is shared by every worker of a run.
#[derive(Clone)]
pub struct StepExecutor {
    backend: Arc<dyn BuildBackend>,
    notifier: Arc<dyn Notifier>,
    poll: PollPolicy,
}

impl StepExecutor {
    pub fn new(
        backend: Arc<dyn BuildBackend>,
        notifier: Arc<dyn Notifier>,
        poll: PollPolicy,
    ) -> Self {
        Self {
            backend,
            notifier,
            poll,
        }
    }

    /// Run one task to completion and record its outcome.
    pub async fn execute(&self, task: &TaskSpec, ctx: &RunContext) -> Result<()> {
        let trigger_key = task.trigger_key();
        let Some(trigger) = ctx.trigger(&trigger_key) else {
            ctx.record_status(&task.key, TaskStatus::Skipped, None).await;
            self.notifier
                .notify(StepEvent::new(
                    &task.key,
                    StepPhase::Skipped,
                    format!("no trigger matching {} found", trigger_key),
                ))
                .await;
            return Err(Error::TriggerNotFound(trigger_key));
        };

        if task.manual && !self.pass_manual_gate(task, ctx).await? {
            return Ok(());
        }

        self.notifier
            .notify(StepEvent::new(&task.key, StepPhase::Started, "started"))
            .await;

        let revision = RevisionSelector::from_ref(&ctx.effective_ref().await);
        let build = match self
            .backend
            .trigger_build(&task.project_id, &trigger.id, &revision)
            .await
        {
            Ok(build) => build,
            Err(err) => {
                ctx.record_status(&task.key, TaskStatus::Failure, None).await;
                self.notifier
                    .notify(StepEvent::new(&task.key, StepPhase::Failed, err.to_string()))
                    .await;
                return Err(Error::TriggerInvocation {
                    task: task.key.clone(),
                    message: err.to_string(),
                });
            }
        };

        ctx.pin_ref(&build.commit_sha).await;
        self.notifier
            .notify(
                StepEvent::new(&task.key, StepPhase::Started, "triggered")
                    .with_log_url(&build.log_url),
            )
            .await;

        let status = match self.wait_for_build(&task.project_id, &build.id).await {
            Ok(status) => status,
            Err(err) => {
                ctx.record_status(&task.key, TaskStatus::Failure, Some(build.log_url.clone()))
                    .await;
                self.notifier
                    .notify(
                        StepEvent::new(&task.key, StepPhase::Failed, err.to_string())
                            .with_log_url(&build.log_url),
                    )
                    .await;
                return Err(err);
            }
        };

        ctx.record_status(&task.key, TaskStatus::from(status), Some(build.log_url.clone()))
            .await;

        match status {
            BuildStatus::Success => {
                self.notifier
                    .notify(
                        StepEvent::new(&task.key, StepPhase::Succeeded, "finished")
                            .with_log_url(&build.log_url),
                    )
                    .await;
                Ok(())
            }
            BuildStatus::Failure | BuildStatus::Cancelled => {
                let phase = if status == BuildStatus::Cancelled {
                    StepPhase::Cancelled
                } else {
                    StepPhase::Failed
                };
                self.notifier
                    .notify(
                        StepEvent::new(&task.key, phase, status.as_str())
                            .with_log_url(&build.log_url),
                    )
                    .await;
                Err(Error::BuildFailed {
                    task: task.key.clone(),
                    status,
                })
            }
            other => {
                self.notifier
                    .notify(
                        StepEvent::new(
                            &task.key,
                            StepPhase::Failed,
                            format!("unexpected build status {}", other),
                        )
                        .with_log_url(&build.log_url),
                    )
                    .await;
                Err(Error::UnknownStatus {
                    task: task.key.clone(),
                    status: other.as_str().to_string(),
                })
            }
        }
    }

    /// The manual gate: every dependency must have succeeded, and the
    /// user must confirm each one. A dependency that did not succeed
    /// skips the task without an error; a declined confirmation cancels
    /// it with one. Returns whether execution should proceed.
    async fn pass_manual_gate(&self, task: &TaskSpec, ctx: &RunContext) -> Result<bool> {
        for dep in &task.depends_on {
            let record = ctx.status(dep).await;
            if !record.status.is_success() {
                ctx.record_status(&task.key, TaskStatus::Skipped, None).await;
                self.notifier
                    .notify(StepEvent::new(
                        &task.key,
                        StepPhase::Skipped,
                        format!("{} depends on {} with status {}", task.key, dep, record.status),
                    ))
                    .await;
                return Ok(false);
            }

            let confirmed = self
                .notifier
                .confirm(
                    &task.key,
                    &format!("Please validate {} to continue", dep),
                    record.log_url.as_deref(),
                )
                .await;
            if !confirmed {
                ctx.record_status(&task.key, TaskStatus::Skipped, None).await;
                self.notifier
                    .notify(StepEvent::new(
                        &task.key,
                        StepPhase::Skipped,
                        format!("{} cancelled by user", task.key),
                    ))
                    .await;
                return Err(Error::UserCancelled(task.key.clone()));
            }
        }
        Ok(true)
    }

    /// Poll until the build leaves the in-flight states. Transient
    /// backend errors are tolerated until the retry budget runs out.
    async fn wait_for_build(&self, project_id: &str, build_id: &str) -> Result<BuildStatus> {
        let mut interval = tokio::time::interval(self.poll.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut retries = self.poll.retries;

        loop {
            interval.tick().await;
            match self.backend.build_status(project_id, build_id).await {
                Ok(status) if status.is_in_flight() => {
                    debug!(build_id, %status, "build still in flight");
                }
                Ok(status) => return Ok(status),
                Err(err) => {
                    if retries == 0 {
                        return Err(Error::PollExhausted {
                            build_id: build_id.to_string(),
                            message: err.to_string(),
                        });
                    }
                    retries -= 1;
                    warn!(build_id, error = %err, retries, "transient error polling build");
                }
            }
        }
    }
}
