//! Pure dependency-graph functions.
//!
//! The graph is rebuilt from the tasks' current `dependencies` on every call
//! and never cached, so a structural answer always reflects the task list it
//! was given. No database access happens here.

use crate::db::models::{DependencyStatus, Task, ValidationResult};
use crate::error::EngineError;
use std::collections::{HashMap, HashSet, VecDeque};

/// Adjacency `task id → ids of the tasks blocking it`, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = Self::default();
        for task in tasks {
            graph.ensure_node(&task.id);
            for blocking in &task.dependencies {
                graph.push_edge(&task.id, blocking);
            }
        }
        graph
    }

    /// The same graph with one hypothetical extra edge.
    pub fn with_edge(mut self, dependent: &str, blocking: &str) -> Self {
        self.ensure_node(dependent);
        self.push_edge(dependent, blocking);
        self
    }

    fn ensure_node(&mut self, id: &str) {
        if !self.edges.contains_key(id) {
            self.order.push(id.to_string());
            self.edges.insert(id.to_string(), Vec::new());
        }
    }

    fn push_edge(&mut self, dependent: &str, blocking: &str) {
        let blockers = self.edges.entry(dependent.to_string()).or_default();
        if !blockers.iter().any(|b| b == blocking) {
            blockers.push(blocking.to_string());
        }
    }

    pub fn blockers_of(&self, id: &str) -> &[String] {
        self.edges.get(id).map(|b| b.as_slice()).unwrap_or(&[])
    }

    /// Every cycle reachable by DFS from every node.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        self.detect_cycles_from(None)
    }

    /// Like [`detect_cycles`](Self::detect_cycles), but starts the search at
    /// `first` so cycles through it are reported beginning with it.
    pub fn detect_cycles_from(&self, first: Option<&str>) -> Vec<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut cycles = Vec::new();

        let starts = first
            .and_then(|id| self.order.iter().find(|n| n.as_str() == id))
            .into_iter()
            .chain(self.order.iter());

        for start in starts {
            if !visited.contains(start.as_str()) {
                self.visit(start, &mut visited, &mut path, &mut on_path, &mut cycles);
            }
        }

        cycles
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
        on_path: &mut HashSet<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node);
        path.push(node);
        on_path.insert(node);

        for neighbor in self.blockers_of(node) {
            let neighbor = neighbor.as_str();
            if on_path.contains(neighbor) {
                if let Some(start) = path.iter().position(|n| *n == neighbor) {
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(neighbor.to_string());
                    cycles.push(cycle);
                }
            } else if !visited.contains(neighbor) {
                self.visit(neighbor, visited, path, on_path, cycles);
            }
        }

        path.pop();
        on_path.remove(node);
    }
}

/// Check whether `dependent_task_id` may start depending on
/// `blocking_task_id` without closing a cycle. No side effects.
pub fn validate_dependency(
    dependent_task_id: &str,
    blocking_task_id: &str,
    all_tasks: &[Task],
) -> ValidationResult {
    if dependent_task_id == blocking_task_id {
        return ValidationResult {
            valid: false,
            errors: vec![EngineError::SelfDependency.to_string()],
            circular_dependencies: None,
        };
    }

    let graph = DependencyGraph::from_tasks(all_tasks).with_edge(dependent_task_id, blocking_task_id);
    let cycles = graph.detect_cycles_from(Some(dependent_task_id));

    if cycles.is_empty() {
        return ValidationResult::ok();
    }

    tracing::debug!(
        dependent_task_id,
        blocking_task_id,
        cycle_count = cycles.len(),
        "Dependency would create a cycle"
    );

    let errors = cycles
        .iter()
        .map(|cycle| format!("Circular dependency detected: {}", cycle.join(" → ")))
        .collect();

    ValidationResult {
        valid: false,
        errors,
        circular_dependencies: Some(cycles),
    }
}

fn index_by_id(tasks: &[Task]) -> HashMap<&str, &Task> {
    tasks.iter().map(|t| (t.id.as_str(), t)).collect()
}

/// Resolve a task's blockers and dependents. Ids that no longer match a
/// task are skipped.
pub fn get_dependency_status(task: &Task, all_tasks: &[Task]) -> DependencyStatus {
    let by_id = index_by_id(all_tasks);

    let blocking_tasks: Vec<Task> = task
        .dependencies
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).map(|t| (*t).clone()))
        .collect();

    let dependent_tasks: Vec<Task> = task
        .dependent_task_ids
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).map(|t| (*t).clone()))
        .collect();

    let is_blocked = blocking_tasks.iter().any(|t| !t.completed);

    DependencyStatus {
        is_blocked,
        blocking_tasks,
        dependent_tasks,
        can_start: !is_blocked,
    }
}

/// Ids of the resolved, incomplete tasks blocking `task`.
pub fn incomplete_blockers(task: &Task, all_tasks: &[Task]) -> Vec<String> {
    let by_id = index_by_id(all_tasks);
    task.dependencies
        .iter()
        .filter(|id| by_id.get(id.as_str()).is_some_and(|t| !t.completed))
        .cloned()
        .collect()
}

/// Recompute the cached `is_blocked` flag of every task from the graph.
pub fn refresh_blocked_flags(tasks: &mut [Task]) {
    let completed: HashMap<String, bool> = tasks
        .iter()
        .map(|t| (t.id.clone(), t.completed))
        .collect();

    for task in tasks.iter_mut() {
        task.is_blocked = task
            .dependencies
            .iter()
            .any(|id| completed.get(id) == Some(&false));
    }
}

/// Tasks ordered so every task comes after the tasks blocking it (Kahn's
/// algorithm). If a cycle is present the input order is returned unchanged.
pub fn get_topological_order(tasks: &[Task]) -> Vec<Task> {
    let by_id = index_by_id(tasks);
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for task in tasks {
        let blockers: HashSet<&str> = task
            .dependencies
            .iter()
            .map(|id| id.as_str())
            .filter(|id| by_id.contains_key(id))
            .collect();

        in_degree.insert(task.id.as_str(), blockers.len());
        for blocker in task.dependencies.iter().map(|id| id.as_str()) {
            if blockers.contains(blocker) {
                let entry = dependents.entry(blocker).or_default();
                if !entry.contains(&task.id.as_str()) {
                    entry.push(task.id.as_str());
                }
            }
        }
    }

    let mut queue: VecDeque<&str> = tasks
        .iter()
        .map(|t| t.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut ordered: Vec<Task> = Vec::with_capacity(tasks.len());
    while let Some(id) = queue.pop_front() {
        if let Some(task) = by_id.get(id) {
            ordered.push((*task).clone());
        }

        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if ordered.len() < tasks.len() {
        tracing::warn!(
            ordered = ordered.len(),
            total = tasks.len(),
            "Residual dependency cycle; returning tasks in original order"
        );
        return tasks.to_vec();
    }

    ordered
}

fn longest_chain<'a>(
    task: &'a Task,
    by_id: &HashMap<&'a str, &'a Task>,
    on_path: &mut HashSet<&'a str>,
    memo: &mut Option<HashMap<&'a str, Vec<&'a Task>>>,
) -> Vec<&'a Task> {
    if let Some(chain) = memo.as_ref().and_then(|m| m.get(task.id.as_str())) {
        return chain.clone();
    }

    on_path.insert(task.id.as_str());

    let mut best: Vec<&'a Task> = Vec::new();
    for dep_id in &task.dependencies {
        if on_path.contains(dep_id.as_str()) {
            continue;
        }
        let Some(dep) = by_id.get(dep_id.as_str()).copied() else {
            continue;
        };
        let chain = longest_chain(dep, by_id, on_path, memo);
        if chain.len() > best.len() {
            best = chain;
        }
    }

    on_path.remove(task.id.as_str());

    let mut chain = Vec::with_capacity(best.len() + 1);
    chain.push(task);
    chain.extend(best);

    if let Some(memo) = memo.as_mut() {
        memo.insert(task.id.as_str(), chain.clone());
    }

    chain
}

/// Longest chain of blocking dependencies, in execution order (the deepest
/// blocker first, ending at the task it ultimately unblocks). Ties keep the
/// first chain found in input order.
pub fn get_critical_path(tasks: &[Task]) -> Vec<Task> {
    let by_id = index_by_id(tasks);

    // Longest chains are path-independent only when the graph is acyclic.
    let mut memo = DependencyGraph::from_tasks(tasks)
        .detect_cycles()
        .is_empty()
        .then(HashMap::new);

    let mut longest: Vec<&Task> = Vec::new();
    for task in tasks {
        let mut on_path = HashSet::new();
        let chain = longest_chain(task, &by_id, &mut on_path, &mut memo);
        if chain.len() > longest.len() {
            longest = chain;
        }
    }

    longest.into_iter().rev().cloned().collect()
}
