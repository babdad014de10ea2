//! Dependency graph over release tasks.
//!
//! The graph is built once from the expanded pipeline configuration and
//! never mutated afterwards; per-run state (statuses, pinned revision)
//! lives in [`crate::context::RunContext`]. Cycle detection happens while
//! edges are inserted, so a successfully built graph is always acyclic.

use cascade_core::pipeline::TaskSpec;
use cascade_core::status::TaskStatus;
use cascade_core::{Error, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Directed acyclic graph of tasks keyed by their unique names.
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskSpec, ()>,
    key_to_index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// Build a graph from the flat task list and the dependency map.
    ///
    /// Fails on duplicate keys, on edges referencing absent tasks, and on
    /// any cycle, including a task depending on itself.
    pub fn build(tasks: Vec<TaskSpec>, links: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut key_to_index = HashMap::new();

        for task in tasks {
            if key_to_index.contains_key(&task.key) {
                return Err(Error::DuplicateTask(task.key));
            }
            let key = task.key.clone();
            let index = graph.add_node(task);
            key_to_index.insert(key, index);
        }

        let mut dag = TaskGraph { graph, key_to_index };
        for (task, deps) in links {
            for dep in deps {
                dag.link(dep, task)?;
            }
        }
        Ok(dag)
    }

    /// Add the directed edge `prev -> next`, refusing edges that would
    /// close a cycle. The check walks backward from `prev` through the
    /// predecessors inserted so far; if it reaches `next`, the offending
    /// key path is returned in the error.
    fn link(&mut self, prev_key: &str, next_key: &str) -> Result<()> {
        let next = *self
            .key_to_index
            .get(next_key)
            .ok_or_else(|| Error::UnknownDependency {
                task: prev_key.to_string(),
                dependency: next_key.to_string(),
            })?;
        let prev = *self
            .key_to_index
            .get(prev_key)
            .ok_or_else(|| Error::UnknownDependency {
                task: next_key.to_string(),
                dependency: prev_key.to_string(),
            })?;

        if prev == next {
            return Err(Error::Cycle {
                path: vec![next_key.to_string(), prev_key.to_string()],
            });
        }

        let mut path = vec![next_key.to_string(), prev_key.to_string()];
        if self.reaches_backward(prev, next, &mut path) {
            return Err(Error::Cycle { path });
        }

        self.graph.add_edge(prev, next, ());
        Ok(())
    }

    /// Depth-first walk over incoming edges from `from`, recording the key
    /// path; true when `target` is an ancestor of `from`.
    fn reaches_backward(&self, from: NodeIndex, target: NodeIndex, path: &mut Vec<String>) -> bool {
        for pred in self.graph.neighbors_directed(from, Direction::Incoming) {
            path.push(self.graph[pred].key.clone());
            if pred == target || self.reaches_backward(pred, target, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// The set of tasks that can be dispatched right now, given a status
    /// snapshot. Unknown keys count as `NotStarted`.
    ///
    /// Per task: `NotStarted` is schedulable iff every predecessor is
    /// `Success`; `Running` never is; a terminal task never is, and a
    /// terminal task with a non-terminal predecessor makes the snapshot
    /// impossible (a task cannot finish before its dependency), which
    /// fails the whole evaluation. This is a full re-scan on every call;
    /// the result depends only on the snapshot, not on call ordering.
    pub fn schedulable_set(
        &self,
        statuses: &HashMap<String, TaskStatus>,
    ) -> Result<BTreeSet<String>> {
        let status_of = |index: NodeIndex| -> TaskStatus {
            statuses
                .get(&self.graph[index].key)
                .copied()
                .unwrap_or_default()
        };

        let mut schedulable = BTreeSet::new();
        for index in self.graph.node_indices() {
            let task = &self.graph[index];
            let status = status_of(index);

            if status == TaskStatus::Running {
                continue;
            }

            if status.is_terminal() {
                for pred in self.graph.neighbors_directed(index, Direction::Incoming) {
                    if !status_of(pred).is_terminal() {
                        return Err(Error::InconsistentState {
                            task: task.key.clone(),
                            dependency: self.graph[pred].key.clone(),
                        });
                    }
                }
                continue;
            }

            let ready = self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .all(|pred| status_of(pred).is_success());
            if ready {
                schedulable.insert(task.key.clone());
            }
        }
        Ok(schedulable)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn get(&self, key: &str) -> Option<&TaskSpec> {
        self.key_to_index.get(key).map(|&index| &self.graph[index])
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.graph.node_indices().map(|index| &self.graph[index])
    }

    /// Tasks with no predecessors.
    pub fn roots(&self) -> Vec<&TaskSpec> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|index| &self.graph[index])
            .collect()
    }

    /// Tasks gated on interactive confirmation.
    pub fn manual_tasks(&self) -> Vec<&TaskSpec> {
        let mut manual: Vec<_> = self.tasks().filter(|t| t.manual).collect();
        manual.sort_by(|a, b| a.key.cmp(&b.key));
        manual
    }

    /// Distinct project ids referenced by the graph.
    pub fn projects(&self) -> BTreeSet<String> {
        self.tasks().map(|t| t.project_id.clone()).collect()
    }

    /// The keys a task directly depends on, in graph order.
    pub fn predecessors(&self, key: &str) -> Vec<&str> {
        self.key_to_index
            .get(key)
            .map(|&index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .map(|pred| self.graph[pred].key.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tasks:")?;
        let mut links: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for index in self.graph.node_indices() {
            writeln!(f, "\t{}", self.graph[index].key)?;
            let successors: Vec<_> = self
                .graph
                .neighbors_directed(index, Direction::Outgoing)
                .map(|next| self.graph[next].key.as_str())
                .collect();
            if !successors.is_empty() {
                links.insert(self.graph[index].key.as_str(), successors);
            }
        }
        if !links.is_empty() {
            writeln!(f, "Links:")?;
            for (key, mut successors) in links {
                successors.sort_unstable();
                writeln!(f, "\t{} -> {}", key, successors.join(", "))?;
            }
        }
        Ok(())
    }
}
