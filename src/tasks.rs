use crate::db::models::{Task, STATUS_DOING, STATUS_DONE};
use crate::dependencies::DependencyManager;
use crate::error::{EngineError, Result};
use crate::graph;
use crate::instances::InstanceManager;
use crate::locks::KeyedLocks;
use crate::recurrence;
use crate::storage::TaskStore;
use uuid::Uuid;

pub struct TaskManager<'a, S: TaskStore> {
    store: &'a S,
    locks: &'a KeyedLocks,
}

fn normalize_date(value: Option<String>) -> Result<Option<String>> {
    value
        .map(|date| recurrence::parse_iso(&date).map(recurrence::format_iso))
        .transpose()
}

impl<'a, S: TaskStore> TaskManager<'a, S> {
    pub fn new(store: &'a S, locks: &'a KeyedLocks) -> Self {
        Self { store, locks }
    }

    /// Create a task. An empty id gets a fresh UUID; a recurrence pattern
    /// makes the task a template. Edges are added through
    /// [`DependencyManager`], never here.
    pub async fn add_task(&self, mut task: Task) -> Result<Task> {
        if task.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("Task name must not be empty".to_string()));
        }
        if task.project_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("Project id must not be empty".to_string()));
        }
        if !task.dependencies.is_empty() || !task.dependent_task_ids.is_empty() {
            return Err(EngineError::InvalidInput(
                "Dependencies must be added after the task exists".to_string(),
            ));
        }

        match &task.recurrence_pattern {
            Some(pattern) => {
                recurrence::validate_rule(pattern)?;
                task.is_recurring = true;
            },
            None if task.is_recurring => {
                return Err(EngineError::InvalidPattern(
                    "Recurring task requires a recurrence pattern".to_string(),
                ));
            },
            None => {},
        }

        if task.id.is_empty() {
            task.id = Uuid::new_v4().to_string();
        }
        task.due_date = normalize_date(task.due_date)?;
        task.start_date = normalize_date(task.start_date)?;
        task.completed = task.status == STATUS_DONE;

        let task = self.store.create_task(&task).await?;
        crate::log_task_operation!("add", task.id, task.project_id);
        Ok(task)
    }

    /// Fetch a task with `is_blocked` recomputed from its project.
    pub async fn get_task(&self, id: &str) -> Result<Task> {
        let mut task = self
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(id.to_string()))?;

        let project_tasks = self.store.list_project_tasks(&task.project_id).await?;
        task.is_blocked = !graph::incomplete_blockers(&task, &project_tasks).is_empty();
        Ok(task)
    }

    pub async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        let mut tasks = self.store.list_project_tasks(project_id).await?;
        graph::refresh_blocked_flags(&mut tasks);
        Ok(tasks)
    }

    async fn ensure_unblocked(&self, id: &str) -> Result<Task> {
        let task = self.get_task(id).await?;
        if !task.is_blocked {
            return Ok(task);
        }

        let project_tasks = self.store.list_project_tasks(&task.project_id).await?;
        let blocking = graph::incomplete_blockers(&task, &project_tasks);
        tracing::warn!(task_id = id, ?blocking, "Task is blocked");
        Err(EngineError::TaskBlocked {
            task_id: id.to_string(),
            blocking,
        })
    }

    /// Move a task to `doing`. Refused while any blocker is incomplete.
    pub async fn start_task(&self, id: &str) -> Result<Task> {
        let mut task = self.ensure_unblocked(id).await?;
        task.status = STATUS_DOING.to_string();
        task.completed = false;

        let task = self.store.update_task(&task).await?;
        crate::log_task_operation!("start", task.id);
        Ok(task)
    }

    /// Mark a task done. Refused while any blocker is incomplete.
    pub async fn complete_task(&self, id: &str) -> Result<Task> {
        let mut task = self.ensure_unblocked(id).await?;
        task.status = STATUS_DONE.to_string();
        task.completed = true;

        let task = self.store.update_task(&task).await?;
        crate::log_task_operation!("complete", task.id);
        Ok(task)
    }

    /// Delete a task after dropping every edge touching it and, for a
    /// template, every instance record.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let task = self
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(id.to_string()))?;

        DependencyManager::new(self.store, self.locks)
            .remove_all_project_dependencies(&task.project_id, id)
            .await?;

        if task.is_template() {
            InstanceManager::new(self.store, self.locks)
                .delete_all_instances(id)
                .await?;
        }

        if !self.store.delete_task(id).await? {
            return Err(EngineError::TaskNotFound(id.to_string()));
        }
        crate::log_task_operation!("delete", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Frequency, RecurrencePattern, STATUS_TODO};
    use crate::test_utils::test_helpers::TestContext;

    #[tokio::test]
    async fn test_add_task_generates_id_and_normalizes_dates() {
        let ctx = TestContext::new().await;
        let store = ctx.store();
        let locks = KeyedLocks::new();
        let mgr = TaskManager::new(&store, &locks);

        let mut task = Task::new("", "p1", "Write report");
        task.due_date = Some("2026-03-01".to_string());
        let task = mgr.add_task(task).await.unwrap();

        assert!(Uuid::parse_str(&task.id).is_ok());
        assert_eq!(task.due_date.as_deref(), Some("2026-03-01T00:00:00.000Z"));
        assert_eq!(task.status, STATUS_TODO);
        assert!(!task.is_recurring);
    }

    #[tokio::test]
    async fn test_add_task_validates_recurrence() {
        let ctx = TestContext::new().await;
        let store = ctx.store();
        let locks = KeyedLocks::new();
        let mgr = TaskManager::new(&store, &locks);

        let mut bad = Task::new("t1", "p1", "Standup");
        bad.recurrence_pattern = Some(RecurrencePattern::new(Frequency::Daily).every(0));
        assert!(matches!(
            mgr.add_task(bad).await.unwrap_err(),
            EngineError::InvalidPattern(_)
        ));

        let mut flagged = Task::new("t2", "p1", "Standup");
        flagged.is_recurring = true;
        assert!(matches!(
            mgr.add_task(flagged).await.unwrap_err(),
            EngineError::InvalidPattern(_)
        ));

        let mut good = Task::new("t3", "p1", "Standup");
        good.recurrence_pattern = Some(RecurrencePattern::new(Frequency::Weekly).on_days(&[1, 3]));
        let template = mgr.add_task(good).await.unwrap();
        assert!(template.is_template());
    }

    #[tokio::test]
    async fn test_add_task_rejects_empty_name_and_inline_edges() {
        let ctx = TestContext::new().await;
        let store = ctx.store();
        let locks = KeyedLocks::new();
        let mgr = TaskManager::new(&store, &locks);

        assert!(matches!(
            mgr.add_task(Task::new("t1", "p1", "  ")).await.unwrap_err(),
            EngineError::InvalidInput(_)
        ));

        let mut with_edge = Task::new("t2", "p1", "B");
        with_edge.dependencies.push("t1".to_string());
        assert!(matches!(
            mgr.add_task(with_edge).await.unwrap_err(),
            EngineError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_blocked_task_cannot_complete_until_blocker_done() {
        let ctx = TestContext::new().await;
        let store = ctx.store();
        let locks = KeyedLocks::new();
        let tasks = TaskManager::new(&store, &locks);
        let deps = DependencyManager::new(&store, &locks);

        tasks.add_task(Task::new("t1", "p1", "Design")).await.unwrap();
        tasks.add_task(Task::new("t2", "p1", "Build")).await.unwrap();
        deps.add_project_dependency("p1", "t2", "t1").await.unwrap();

        assert!(tasks.get_task("t2").await.unwrap().is_blocked);
        match tasks.complete_task("t2").await.unwrap_err() {
            EngineError::TaskBlocked { task_id, blocking } => {
                assert_eq!(task_id, "t2");
                assert_eq!(blocking, vec!["t1"]);
            },
            other => panic!("expected TaskBlocked, got {:?}", other),
        }
        assert!(tasks.start_task("t2").await.is_err());

        let done = tasks.complete_task("t1").await.unwrap();
        assert!(done.completed);
        assert_eq!(done.status, STATUS_DONE);

        assert!(!tasks.get_task("t2").await.unwrap().is_blocked);
        let started = tasks.start_task("t2").await.unwrap();
        assert_eq!(started.status, STATUS_DOING);
    }

    #[tokio::test]
    async fn test_list_tasks_recomputes_blocked_flags() {
        let ctx = TestContext::new().await;
        let store = ctx.store();
        let locks = KeyedLocks::new();
        let tasks = TaskManager::new(&store, &locks);
        let deps = DependencyManager::new(&store, &locks);

        tasks.add_task(Task::new("a", "p1", "A")).await.unwrap();
        tasks.add_task(Task::new("b", "p1", "B")).await.unwrap();
        deps.add_project_dependency("p1", "b", "a").await.unwrap();

        let listed = tasks.list_tasks("p1").await.unwrap();
        let blocked: Vec<&str> = listed
            .iter()
            .filter(|t| t.is_blocked)
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(blocked, vec!["b"]);
    }

    #[tokio::test]
    async fn test_delete_task_cascades_edges_and_instances() {
        let ctx = TestContext::new().await;
        let store = ctx.store();
        let locks = KeyedLocks::new();
        let tasks = TaskManager::new(&store, &locks);
        let deps = DependencyManager::new(&store, &locks);
        let instances = InstanceManager::new(&store, &locks);

        let mut template = Task::new("tpl", "p1", "Weekly review");
        template.recurrence_pattern = Some(RecurrencePattern::new(Frequency::Weekly).on_days(&[5]));
        let template = tasks.add_task(template).await.unwrap();
        tasks.add_task(Task::new("after", "p1", "After")).await.unwrap();
        deps.add_project_dependency("p1", "after", "tpl").await.unwrap();
        instances.materialize_next(&template, "2026-01-02").await.unwrap();

        tasks.delete_task("tpl").await.unwrap();

        assert!(matches!(
            tasks.get_task("tpl").await.unwrap_err(),
            EngineError::TaskNotFound(_)
        ));
        let after = tasks.get_task("after").await.unwrap();
        assert!(after.dependencies.is_empty());
        assert!(!after.is_blocked);
        assert!(instances.get_instances("tpl").await.unwrap().is_empty());

        assert!(matches!(
            tasks.delete_task("tpl").await.unwrap_err(),
            EngineError::TaskNotFound(_)
        ));
    }
}
