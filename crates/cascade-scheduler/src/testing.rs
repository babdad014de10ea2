//! In-memory fakes for the backend and notifier ports, shared by the
//! executor and coordinator tests.

use async_trait::async_trait;
use cascade_core::ports::{BuildBackend, BuildOperation, Notifier, StepEvent, StepPhase, TriggerHandle};
use cascade_core::revision::RevisionSelector;
use cascade_core::status::BuildStatus;
use cascade_core::{Error, Result};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// One scripted answer of the fake backend's status endpoint.
#[derive(Debug, Clone)]
pub(crate) enum PollStep {
    Status(BuildStatus),
    Error(String),
}

#[derive(Debug, Clone)]
struct BuildPlan {
    commit_sha: String,
    steps: VecDeque<PollStep>,
}

#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    pub project_id: String,
    pub trigger_id: String,
    pub revision: RevisionSelector,
}

/// Scripted build backend: triggers are registered up front, and each
/// trigger id maps to a fixed commit sha plus a sequence of status-poll
/// answers (the last one repeats if polled past the end).
pub(crate) struct FakeBackend {
    triggers: HashMap<String, TriggerHandle>,
    plans: Mutex<HashMap<String, BuildPlan>>,
    failing: HashMap<String, String>,
    invocations: Mutex<Vec<Invocation>>,
    list_calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            triggers: HashMap::new(),
            plans: Mutex::new(HashMap::new()),
            failing: HashMap::new(),
            invocations: Mutex::new(Vec::new()),
            list_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_trigger(mut self, project_id: &str, name: &str, id: &str) -> Self {
        self.triggers.insert(
            format!("{}/{}", project_id, name),
            TriggerHandle {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_build(mut self, trigger_id: &str, commit_sha: &str, steps: &[PollStep]) -> Self {
        self.plans.get_mut().insert(
            trigger_id.to_string(),
            BuildPlan {
                commit_sha: commit_sha.to_string(),
                steps: steps.iter().cloned().collect(),
            },
        );
        self
    }

    pub fn with_failing_trigger(mut self, trigger_id: &str, message: &str) -> Self {
        self.failing
            .insert(trigger_id.to_string(), message.to_string());
        self
    }

    /// The full trigger cache, as the coordinator would assemble it.
    pub fn trigger_cache(&self) -> HashMap<String, TriggerHandle> {
        self.triggers.clone()
    }

    pub async fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().await.clone()
    }

    pub async fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().await.clone()
    }

    fn build_id(trigger_id: &str) -> String {
        format!("{}-build", trigger_id)
    }
}

#[async_trait]
impl BuildBackend for FakeBackend {
    async fn list_triggers(&self, project_id: &str) -> Result<HashMap<String, TriggerHandle>> {
        self.list_calls.lock().await.push(project_id.to_string());
        let prefix = format!("{}/", project_id);
        Ok(self
            .triggers
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, handle)| (key.clone(), handle.clone()))
            .collect())
    }

    async fn trigger_build(
        &self,
        project_id: &str,
        trigger_id: &str,
        revision: &RevisionSelector,
    ) -> Result<BuildOperation> {
        self.invocations.lock().await.push(Invocation {
            project_id: project_id.to_string(),
            trigger_id: trigger_id.to_string(),
            revision: revision.clone(),
        });
        if let Some(message) = self.failing.get(trigger_id) {
            return Err(Error::Backend(message.clone()));
        }
        let plans = self.plans.lock().await;
        let plan = plans
            .get(trigger_id)
            .ok_or_else(|| Error::Backend(format!("no build plan for {}", trigger_id)))?;
        Ok(BuildOperation {
            id: Self::build_id(trigger_id),
            log_url: format!("https://logs/{}", trigger_id),
            commit_sha: plan.commit_sha.clone(),
        })
    }

    async fn build_status(&self, _project_id: &str, build_id: &str) -> Result<BuildStatus> {
        let trigger_id = build_id.strip_suffix("-build").unwrap_or(build_id);
        let mut plans = self.plans.lock().await;
        let plan = plans
            .get_mut(trigger_id)
            .ok_or_else(|| Error::Backend(format!("unknown build {}", build_id)))?;
        let step = if plan.steps.len() > 1 {
            plan.steps.pop_front().unwrap_or(PollStep::Error("script empty".to_string()))
        } else {
            plan.steps
                .front()
                .cloned()
                .unwrap_or(PollStep::Error("script empty".to_string()))
        };
        match step {
            PollStep::Status(status) => Ok(status),
            PollStep::Error(message) => Err(Error::Backend(message)),
        }
    }
}

/// Notifier fake: records every event, counts confirmations, and answers
/// prompts from a scripted queue (defaulting to yes when the queue runs
/// dry).
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<StepEvent>>,
    answers: Mutex<VecDeque<bool>>,
    confirmations: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            answers: Mutex::new(VecDeque::new()),
            confirmations: Mutex::new(0),
        }
    }

    pub fn with_answers(mut self, answers: &[bool]) -> Self {
        self.answers.get_mut().extend(answers.iter().copied());
        self
    }

    pub async fn events(&self) -> Vec<StepEvent> {
        self.events.lock().await.clone()
    }

    pub async fn phases_for(&self, task: &str) -> Vec<StepPhase> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.task == task)
            .map(|e| e.phase)
            .collect()
    }

    pub async fn confirmations(&self) -> usize {
        *self.confirmations.lock().await
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: StepEvent) {
        self.events.lock().await.push(event);
    }

    async fn confirm(&self, _task: &str, _message: &str, _log_url: Option<&str>) -> bool {
        *self.confirmations.lock().await += 1;
        self.answers.lock().await.pop_front().unwrap_or(true)
    }
}
