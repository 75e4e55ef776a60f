use crate::db::models::{Dependency, DependencyAction, DependencyStatus, Task, ValidationResult};
use crate::error::{EngineError, Result};
use crate::graph;
use crate::locks::KeyedLocks;
use crate::storage::TaskStore;

/// Maintain the `dependent_task_ids` mirror on the blocking task.
///
/// Set semantics: adding twice keeps one entry, removing an absent entry is
/// a no-op. Must run on every successful edge add/remove.
pub fn update_dependent_task_ids(
    tasks: &mut [Task],
    dependent_task_id: &str,
    blocking_task_id: &str,
    action: DependencyAction,
) {
    let Some(blocking) = tasks.iter_mut().find(|t| t.id == blocking_task_id) else {
        return;
    };

    match action {
        DependencyAction::Add => {
            if !blocking.dependent_task_ids.iter().any(|id| id == dependent_task_id) {
                blocking.dependent_task_ids.push(dependent_task_id.to_string());
            }
        },
        DependencyAction::Remove => {
            blocking.dependent_task_ids.retain(|id| id != dependent_task_id);
        },
    }
}

fn update_dependencies(
    tasks: &mut [Task],
    dependent_task_id: &str,
    blocking_task_id: &str,
    action: DependencyAction,
) {
    let Some(dependent) = tasks.iter_mut().find(|t| t.id == dependent_task_id) else {
        return;
    };

    match action {
        DependencyAction::Add => {
            if !dependent.dependencies.iter().any(|id| id == blocking_task_id) {
                dependent.dependencies.push(blocking_task_id.to_string());
            }
        },
        DependencyAction::Remove => {
            dependent.dependencies.retain(|id| id != blocking_task_id);
        },
    }
}

fn persistence_failed(dependent_task_id: &str, blocking_task_id: &str) -> EngineError {
    EngineError::PersistenceFailed(format!(
        "dependency {} -> {}",
        dependent_task_id, blocking_task_id
    ))
}

/// Reject an edge the graph of `tasks` does not allow.
fn ensure_valid(dependent_task_id: &str, blocking_task_id: &str, tasks: &[Task]) -> Result<()> {
    let validation = graph::validate_dependency(dependent_task_id, blocking_task_id, tasks);
    if validation.valid {
        return Ok(());
    }

    tracing::warn!(
        dependent_task_id,
        blocking_task_id,
        errors = ?validation.errors,
        "Dependency rejected"
    );
    Err(match validation.circular_dependencies {
        Some(cycles) => EngineError::CircularDependency { cycles },
        None => EngineError::SelfDependency,
    })
}

fn ensure_endpoints(tasks: &[Task], endpoints: &[&str]) -> Result<()> {
    match endpoints
        .iter()
        .find(|id| !tasks.iter().any(|t| t.id == **id))
    {
        Some(id) => Err(EngineError::TaskNotFound(id.to_string())),
        None => Ok(()),
    }
}

/// The only writer of dependency edges.
///
/// Every addition is validated against the graph of the task list it is
/// given, persisted, and then mirrored into that list. The `*_project_*`
/// variants take the project's mutation lock and read the task list from
/// storage; an edge addition validates and inserts inside one database
/// write transaction, so writers in other processes are serialized too.
pub struct DependencyManager<'a, S: TaskStore> {
    store: &'a S,
    locks: &'a KeyedLocks,
}

impl<'a, S: TaskStore> DependencyManager<'a, S> {
    pub fn new(store: &'a S, locks: &'a KeyedLocks) -> Self {
        Self { store, locks }
    }

    pub fn validate(
        &self,
        dependent_task_id: &str,
        blocking_task_id: &str,
        all_tasks: &[Task],
    ) -> ValidationResult {
        graph::validate_dependency(dependent_task_id, blocking_task_id, all_tasks)
    }

    /// Add "`dependent_task_id` is blocked by `blocking_task_id`".
    ///
    /// `tasks` must reflect every persisted edge of the validation scope. On
    /// any error it is left untouched.
    pub async fn add_dependency(
        &self,
        tasks: &mut [Task],
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> Result<Dependency> {
        ensure_valid(dependent_task_id, blocking_task_id, tasks)?;

        let dependency = self
            .store
            .create_task_dependency(dependent_task_id, blocking_task_id)
            .await?
            .ok_or_else(|| persistence_failed(dependent_task_id, blocking_task_id))?;

        update_dependencies(tasks, dependent_task_id, blocking_task_id, DependencyAction::Add);
        update_dependent_task_ids(tasks, dependent_task_id, blocking_task_id, DependencyAction::Add);
        graph::refresh_blocked_flags(tasks);

        crate::log_dependency_operation!("add", dependent_task_id, blocking_task_id);
        Ok(dependency)
    }

    /// Remove one edge. Returns whether storage had it.
    pub async fn remove_dependency(
        &self,
        tasks: &mut [Task],
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> Result<bool> {
        let removed = self
            .store
            .delete_task_dependency(dependent_task_id, blocking_task_id)
            .await?;

        update_dependencies(tasks, dependent_task_id, blocking_task_id, DependencyAction::Remove);
        update_dependent_task_ids(
            tasks,
            dependent_task_id,
            blocking_task_id,
            DependencyAction::Remove,
        );
        graph::refresh_blocked_flags(tasks);

        if removed {
            crate::log_dependency_operation!("remove", dependent_task_id, blocking_task_id);
        }
        Ok(removed)
    }

    /// Remove every edge touching `task_id`; used before deleting the task.
    pub async fn remove_all_dependencies(&self, tasks: &mut [Task], task_id: &str) -> Result<bool> {
        let removed = self.store.delete_all_task_dependencies(task_id).await?;

        let edges: Vec<(String, String)> = tasks
            .iter()
            .flat_map(|t| {
                t.dependencies
                    .iter()
                    .map(move |blocking| (t.id.clone(), blocking.clone()))
            })
            .filter(|(dependent, blocking)| dependent == task_id || blocking == task_id)
            .collect();

        for (dependent, blocking) in &edges {
            update_dependencies(tasks, dependent, blocking, DependencyAction::Remove);
            update_dependent_task_ids(tasks, dependent, blocking, DependencyAction::Remove);
        }

        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.dependencies.clear();
            task.dependent_task_ids.clear();
        }
        graph::refresh_blocked_flags(tasks);

        crate::log_task_operation!("remove_all_dependencies", task_id, edges.len());
        Ok(removed)
    }

    /// Explain an endpoint missing from `project_id`: it either lives in
    /// another project or does not exist at all.
    async fn scope_error(&self, project_id: &str, err: EngineError) -> EngineError {
        let EngineError::TaskNotFound(id) = &err else {
            return err;
        };

        match self.store.get_task(id).await {
            Ok(Some(other)) => EngineError::InvalidInput(format!(
                "Task {} belongs to project {}, not {}; cross-project dependencies are not supported",
                id, other.project_id, project_id
            )),
            Ok(None) => err,
            Err(lookup) => lookup,
        }
    }

    async fn load_project_scope(
        &self,
        project_id: &str,
        endpoints: &[&str],
    ) -> Result<Vec<Task>> {
        let tasks = self.store.list_project_tasks(project_id).await?;
        if let Err(err) = ensure_endpoints(&tasks, endpoints) {
            return Err(self.scope_error(project_id, err).await);
        }
        Ok(tasks)
    }

    /// Validate-then-persist against the project's current edges, as one
    /// database write transaction.
    pub async fn add_project_dependency(
        &self,
        project_id: &str,
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> Result<Dependency> {
        let _guard = self.locks.lock(project_id).await;

        let written = self
            .store
            .create_checked_task_dependency(project_id, dependent_task_id, blocking_task_id, |tasks| {
                ensure_endpoints(tasks, &[dependent_task_id, blocking_task_id])?;
                ensure_valid(dependent_task_id, blocking_task_id, tasks)
            })
            .await;

        let dependency = match written {
            Ok(Some(dependency)) => dependency,
            Ok(None) => return Err(persistence_failed(dependent_task_id, blocking_task_id)),
            Err(err @ EngineError::TaskNotFound(_)) => {
                return Err(self.scope_error(project_id, err).await)
            },
            Err(err) => return Err(err),
        };

        crate::log_dependency_operation!("add", dependent_task_id, blocking_task_id);
        Ok(dependency)
    }

    pub async fn remove_project_dependency(
        &self,
        project_id: &str,
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> Result<bool> {
        let _guard = self.locks.lock(project_id).await;
        let mut tasks = self.store.list_project_tasks(project_id).await?;
        self.remove_dependency(&mut tasks, dependent_task_id, blocking_task_id)
            .await
    }

    pub async fn remove_all_project_dependencies(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<bool> {
        let _guard = self.locks.lock(project_id).await;
        let mut tasks = self.store.list_project_tasks(project_id).await?;
        self.remove_all_dependencies(&mut tasks, task_id).await
    }

    /// Check a prospective edge against the project's persisted state.
    pub async fn validate_project_dependency(
        &self,
        project_id: &str,
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> Result<ValidationResult> {
        let tasks = self
            .load_project_scope(project_id, &[dependent_task_id, blocking_task_id])
            .await?;
        Ok(self.validate(dependent_task_id, blocking_task_id, &tasks))
    }

    pub async fn get_task_dependencies(&self, task_id: &str) -> Result<Vec<Dependency>> {
        self.store.get_task_dependencies(task_id).await
    }

    pub async fn get_dependent_tasks(&self, task_id: &str) -> Result<Vec<Task>> {
        self.store.get_dependent_tasks(task_id).await
    }

    /// Blocked/ready status of a task, resolved within its project.
    pub async fn get_dependency_status(&self, task_id: &str) -> Result<DependencyStatus> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let tasks = self.store.list_project_tasks(&task.project_id).await?;
        Ok(graph::get_dependency_status(&task, &tasks))
    }

    pub async fn get_topological_order(&self, project_id: &str) -> Result<Vec<Task>> {
        let mut tasks = self.store.list_project_tasks(project_id).await?;
        graph::refresh_blocked_flags(&mut tasks);
        Ok(graph::get_topological_order(&tasks))
    }

    pub async fn get_critical_path(&self, project_id: &str) -> Result<Vec<Task>> {
        let mut tasks = self.store.list_project_tasks(project_id).await?;
        graph::refresh_blocked_flags(&mut tasks);
        Ok(graph::get_critical_path(&tasks))
    }
}
