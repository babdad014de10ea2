//! Pipeline configuration.
//!
//! These types represent the user-authored pipeline YAML: an ordered list
//! of steps, each mapping to one remote build trigger, with dependencies
//! between them. A step may instead be a parallel group; groups are
//! expanded into ordinary tasks before the graph is built.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    /// Comma-separated tags used by include/exclude filtering.
    #[serde(default)]
    pub tags: Option<String>,
    /// Sub-steps of a parallel group. A step with sub-steps carries no
    /// trigger of its own.
    #[serde(default)]
    pub parallel: Vec<StepConfig>,
}

impl StepConfig {
    pub fn is_group(&self) -> bool {
        !self.parallel.is_empty()
    }

    fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|t| t.trim().to_string())
            .collect()
    }
}

/// A single schedulable unit after group expansion. Immutable for the
/// whole run; mutable per-run state lives in the run context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub key: String,
    pub project_id: String,
    pub trigger_name: String,
    pub manual: bool,
    pub depends_on: Vec<String>,
}

impl TaskSpec {
    /// The `"{project_id}/{trigger_name}"` key used by the trigger cache.
    pub fn trigger_key(&self) -> String {
        format!("{}/{}", self.project_id, self.trigger_name)
    }
}

/// A non-fatal finding from configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub kind: &'static str,
    pub message: String,
}

/// Everything validation found, errors and warnings both; errors are
/// collected rather than reported first-only.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub warnings: Vec<ConfigWarning>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<ConfigWarning>> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(Error::InvalidConfig(self.errors.join("\n")))
        }
    }
}

impl PipelineConfig {
    /// Load and parse a pipeline file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&source)?)
    }

    /// Validate the configuration before any scheduling happens.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.steps.is_empty() {
            report.warnings.push(ConfigWarning {
                kind: "steps",
                message: "no steps defined".to_string(),
            });
            report.errors.push("no steps defined".to_string());
        }

        for step in &self.steps {
            if step.is_group() {
                validate_group(step, &mut report);
            } else {
                validate_simple(step, &mut report);
            }
        }

        report
    }

    /// Keep only the steps whose tags pass the include/exclude filters.
    ///
    /// A step survives when at least one of its tags is in `include` (or
    /// `include` is empty) and that same tag is not in `exclude`. Steps
    /// without tags carry a single empty tag, so an include filter drops
    /// them. Dependencies are not rewritten: filtering out a step that
    /// others depend on surfaces as an unknown-dependency error at graph
    /// build time rather than as a silently dropped edge.
    pub fn filter(&self, include: &[String], exclude: &[String]) -> PipelineConfig {
        let steps = self
            .steps
            .iter()
            .filter(|step| keep_step(include, exclude, &step.tag_list()))
            .cloned()
            .collect();
        PipelineConfig {
            name: self.name.clone(),
            author: self.author.clone(),
            description: self.description.clone(),
            steps,
        }
    }

    /// Expand parallel groups and produce the flat task list the graph is
    /// built from. Sub-steps keep their own names as keys and inherit the
    /// group's dependencies, manual flag, and tags.
    pub fn tasks(&self) -> Vec<TaskSpec> {
        let mut tasks = Vec::new();
        for step in &self.steps {
            if step.is_group() {
                for sub in &step.parallel {
                    let mut depends_on = step.depends_on.clone();
                    depends_on.extend(sub.depends_on.iter().cloned());
                    tasks.push(TaskSpec {
                        key: sub.name.clone().unwrap_or_default(),
                        project_id: sub.project_id.clone().unwrap_or_default(),
                        trigger_name: sub.trigger.clone().unwrap_or_default(),
                        manual: step.manual || sub.manual,
                        depends_on,
                    });
                }
            } else {
                tasks.push(TaskSpec {
                    key: step.name.clone().unwrap_or_default(),
                    project_id: step.project_id.clone().unwrap_or_default(),
                    trigger_name: step.trigger.clone().unwrap_or_default(),
                    manual: step.manual,
                    depends_on: step.depends_on.clone(),
                });
            }
        }
        tasks
    }

    /// The dependency map used to build the graph: task key to the keys it
    /// depends on, omitting tasks without dependencies.
    pub fn links(&self) -> HashMap<String, Vec<String>> {
        self.tasks()
            .into_iter()
            .filter(|t| !t.depends_on.is_empty())
            .map(|t| (t.key, t.depends_on))
            .collect()
    }
}

fn validate_simple(step: &StepConfig, report: &mut ValidationReport) {
    if step.name.as_deref().unwrap_or("").is_empty() {
        report.errors.push("step missing name".to_string());
    }
    if step.project_id.as_deref().unwrap_or("").is_empty() {
        report.errors.push("step missing project-id".to_string());
    }
    if step.trigger.as_deref().unwrap_or("").is_empty() {
        report.errors.push("step missing trigger".to_string());
    }
}

fn validate_group(group: &StepConfig, report: &mut ValidationReport) {
    if group.name.is_some() {
        report.warnings.push(ConfigWarning {
            kind: "step",
            message: "name not needed for parallel steps".to_string(),
        });
    }
    if group.project_id.is_some() {
        report.warnings.push(ConfigWarning {
            kind: "step",
            message: "project-id not needed for parallel steps".to_string(),
        });
    }
    if group.trigger.is_some() {
        report
            .errors
            .push("parallel steps cannot be used when a trigger is defined".to_string());
    }
    for sub in &group.parallel {
        validate_simple(sub, report);
    }
}

fn keep_step(include: &[String], exclude: &[String], tags: &[String]) -> bool {
    tags.iter().any(|tag| {
        (include.is_empty() || include.contains(tag))
            && (exclude.is_empty() || !exclude.contains(tag))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn simple_step(name: &str, deps: &[&str]) -> StepConfig {
        StepConfig {
            name: Some(name.to_string()),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            project_id: Some("proj".to_string()),
            trigger: Some(format!("{}-trigger", name)),
            ..Default::default()
        }
    }

    fn config(steps: Vec<StepConfig>) -> PipelineConfig {
        PipelineConfig {
            name: "release".to_string(),
            author: None,
            description: None,
            steps,
        }
    }

    #[test]
    fn parse_kebab_case_fields() {
        let yaml = r#"
name: release
steps:
  - name: build
    project-id: acme-prod
    trigger: build-all
  - name: deploy
    project-id: acme-prod
    trigger: deploy-all
    manual: true
    depends-on: [build]
    tags: "app,deploy"
"#;
        let parsed: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[1].depends_on, vec!["build".to_string()]);
        assert!(parsed.steps[1].manual);
        assert_eq!(parsed.steps[1].project_id.as_deref(), Some("acme-prod"));
    }

    #[test]
    fn validate_accepts_complete_steps() {
        let report = config(vec![simple_step("build", &[])]).validate();
        assert!(report.is_ok());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn validate_collects_all_errors() {
        let report = config(vec![StepConfig::default()]).validate();
        assert_eq!(
            report.errors,
            vec![
                "step missing name".to_string(),
                "step missing project-id".to_string(),
                "step missing trigger".to_string(),
            ]
        );
    }

    #[test]
    fn validate_empty_pipeline_is_an_error() {
        let report = config(vec![]).validate();
        assert!(!report.is_ok());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn validate_group_with_trigger_is_an_error() {
        let group = StepConfig {
            trigger: Some("oops".to_string()),
            parallel: vec![simple_step("sub", &[])],
            ..Default::default()
        };
        let report = config(vec![group]).validate();
        assert_eq!(
            report.errors,
            vec!["parallel steps cannot be used when a trigger is defined".to_string()]
        );
    }

    #[test]
    fn validate_named_group_warns() {
        let group = StepConfig {
            name: Some("group".to_string()),
            parallel: vec![simple_step("sub", &[])],
            ..Default::default()
        };
        let report = config(vec![group]).validate();
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, "step");
    }

    #[test]
    fn group_expansion_inherits_dependencies() {
        let group = StepConfig {
            depends_on: vec!["build".to_string()],
            manual: true,
            parallel: vec![simple_step("deploy-eu", &[]), simple_step("deploy-us", &["warmup"])],
            ..Default::default()
        };
        let cfg = config(vec![simple_step("build", &[]), group]);

        let tasks = cfg.tasks();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[1].key, "deploy-eu");
        assert!(tasks[1].manual);
        assert_eq!(tasks[1].depends_on, vec!["build".to_string()]);
        assert_eq!(
            tasks[2].depends_on,
            vec!["build".to_string(), "warmup".to_string()]
        );

        let links = cfg.links();
        assert!(!links.contains_key("build"));
        assert_eq!(links["deploy-eu"], vec!["build".to_string()]);
    }

    #[test]
    fn filter_by_tags() {
        let mut tagged = simple_step("deploy", &[]);
        tagged.tags = Some("app,deploy".to_string());
        let mut infra = simple_step("terraform", &[]);
        infra.tags = Some("infra".to_string());
        let untagged = simple_step("lint", &[]);
        let cfg = config(vec![tagged, infra, untagged]);

        let included = cfg.filter(&["app".to_string()], &[]);
        assert_eq!(included.steps.len(), 1);
        assert_eq!(included.steps[0].name.as_deref(), Some("deploy"));

        // An exclude filter only drops steps whose every tag is excluded.
        let excluded = cfg.filter(&[], &["infra".to_string()]);
        let names: Vec<_> = excluded
            .steps
            .iter()
            .map(|s| s.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["deploy", "lint"]);

        // A step tagged both ways survives on its non-excluded tag.
        let both = cfg.filter(&[], &["deploy".to_string()]);
        let names: Vec<_> = both
            .steps
            .iter()
            .map(|s| s.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["deploy", "terraform", "lint"]);
    }

    #[test]
    fn include_filter_drops_untagged_steps() {
        let cfg = config(vec![simple_step("lint", &[])]);
        assert!(cfg.filter(&["app".to_string()], &[]).steps.is_empty());
        assert_eq!(cfg.filter(&[], &[]).steps.len(), 1);
    }

    #[test]
    fn trigger_key_format() {
        let task = &config(vec![simple_step("build", &[])]).tasks()[0];
        assert_eq!(task.trigger_key(), "proj/build-trigger");
    }
}
