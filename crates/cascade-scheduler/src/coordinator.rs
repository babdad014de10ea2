//! Run coordination: the worker pool and the dispatch loop.
//!
//! A coordinator is built per run and owns its queues and workers; there
//! is no process-wide scheduling state, so independent runs can coexist
//! (and tests get a fresh world each time).

use crate::context::{RunContext, StatusRecord};
use crate::dag::TaskGraph;
use crate::executor::{PollPolicy, StepExecutor};
use cascade_core::ports::{BuildBackend, Notifier, StepEvent, StepPhase, TriggerHandle};
use cascade_core::status::TaskStatus;
use cascade_core::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker pool width.
    pub concurrency: usize,
    /// Stop dispatching new tasks after the first failed one.
    pub fast_fail: bool,
    pub poll: PollPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 20,
            fast_fail: true,
            poll: PollPolicy::default(),
        }
    }
}

/// Final state of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Per-task outcome, keyed by task.
    pub tasks: BTreeMap<String, StatusRecord>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.tasks.values().all(|record| record.status.is_success())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Schedules one graph run over a bounded worker pool.
pub struct Coordinator {
    graph: Arc<TaskGraph>,
    backend: Arc<dyn BuildBackend>,
    notifier: Arc<dyn Notifier>,
    options: RunOptions,
}

impl Coordinator {
    pub fn new(
        graph: TaskGraph,
        backend: Arc<dyn BuildBackend>,
        notifier: Arc<dyn Notifier>,
        options: RunOptions,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            backend,
            notifier,
            options,
        }
    }

    /// Drive every task of the graph to a terminal state, or stop at the
    /// first failure when fast-fail is on.
    pub async fn run(&self, requested_ref: &str) -> Result<RunReport> {
        let started_at = Utc::now();
        let triggers = self.resolve_triggers().await?;
        let ctx = Arc::new(RunContext::new(requested_ref, triggers));

        let total = self.graph.len();
        let (job_tx, job_rx) = mpsc::channel::<String>(total.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<(String, Result<()>)>(total.max(1));

        let executor = StepExecutor::new(
            self.backend.clone(),
            self.notifier.clone(),
            self.options.poll,
        );
        let mut workers = JoinSet::new();
        for _ in 0..self.options.concurrency.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let executor = executor.clone();
            let ctx = ctx.clone();
            let graph = self.graph.clone();
            workers.spawn(async move {
                loop {
                    // Holding the lock while waiting hands jobs out one at
                    // a time; execution itself runs outside the lock.
                    let key = { job_rx.lock().await.recv().await };
                    let Some(key) = key else { break };
                    let Some(task) = graph.get(&key) else { continue };
                    let result = executor.execute(task, &ctx).await;
                    if result_tx.send((key, result)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut dispatched = HashSet::new();
        let mut completed = 0usize;
        let mut fatal = None;
        let mut run_error = None;

        if let Err(err) = self.dispatch_ready(&ctx, &job_tx, &mut dispatched).await {
            fatal = Some(err);
        }

        while fatal.is_none() && completed < total {
            if dispatched.len() == completed {
                // Nothing in flight and nothing newly schedulable: the
                // remainder is blocked behind non-successful tasks.
                break;
            }
            let Some((key, result)) = result_rx.recv().await else {
                break;
            };
            completed += 1;
            match result {
                Ok(()) => {
                    debug!(task = %key, "task finished");
                }
                Err(err) => {
                    info!(task = %key, error = %err, "task failed");
                    if self.options.fast_fail {
                        warn!("fast failing; no new tasks will be dispatched");
                        run_error = Some(err);
                        break;
                    }
                }
            }
            if let Err(err) = self.dispatch_ready(&ctx, &job_tx, &mut dispatched).await {
                fatal = Some(err);
                break;
            }
        }

        // Close the queue; idle workers exit, in-flight jobs finish but
        // their results are not examined further.
        drop(job_tx);
        while workers.join_next().await.is_some() {}

        if let Some(err) = fatal {
            return Err(err);
        }
        if let Some(err) = run_error {
            return Err(err);
        }

        self.mark_blocked(&ctx, &dispatched).await;

        let records = ctx.records().await;
        let tasks = self
            .graph
            .tasks()
            .map(|task| {
                let record = records.get(&task.key).cloned().unwrap_or_default();
                (task.key.clone(), record)
            })
            .collect();

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            tasks,
        })
    }

    /// Resolve the trigger cache once, before dispatch begins: one listing
    /// per distinct project referenced by the graph.
    async fn resolve_triggers(&self) -> Result<HashMap<String, TriggerHandle>> {
        let mut triggers = HashMap::new();
        for project in self.graph.projects() {
            let listed = self.backend.list_triggers(&project).await?;
            debug!(project = %project, count = listed.len(), "listed triggers");
            triggers.extend(listed);
        }
        Ok(triggers)
    }

    /// Enqueue every schedulable task that has not been dispatched yet.
    /// Tasks are marked `Running` before they enter the queue so a later
    /// recomputation cannot pick them again.
    async fn dispatch_ready(
        &self,
        ctx: &RunContext,
        job_tx: &mpsc::Sender<String>,
        dispatched: &mut HashSet<String>,
    ) -> Result<()> {
        let snapshot = ctx.snapshot().await;
        let ready = self.graph.schedulable_set(&snapshot)?;
        for key in ready {
            if dispatched.contains(&key) {
                continue;
            }
            ctx.record_status(&key, TaskStatus::Running, None).await;
            dispatched.insert(key.clone());
            debug!(task = %key, "dispatching");
            if job_tx.send(key).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Record tasks that never became schedulable as skipped, naming the
    /// dependency that blocked them, so the run report never silently
    /// omits a task.
    async fn mark_blocked(&self, ctx: &RunContext, dispatched: &HashSet<String>) {
        for task in self.graph.tasks() {
            if dispatched.contains(&task.key) {
                continue;
            }
            if ctx.status(&task.key).await.status.has_started() {
                continue;
            }
            let mut blocker = None;
            for dep in &task.depends_on {
                let status = ctx.status(dep).await.status;
                if !status.is_success() {
                    blocker = Some((dep.clone(), status));
                    break;
                }
            }
            ctx.record_status(&task.key, TaskStatus::Skipped, None).await;
            let message = match blocker {
                Some((dep, status)) => {
                    format!("{} depends on {} with status {}", task.key, dep, status)
                }
                None => format!("{} was never scheduled", task.key),
            };
            self.notifier
                .notify(StepEvent::new(&task.key, StepPhase::Skipped, message))
                .await;
        }
    }
}
