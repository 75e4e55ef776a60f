//! Storage collaborator.
//!
//! [`TaskStore`] is the keyed store the engine's services talk to. The
//! services never issue SQL themselves; [`SqliteTaskStore`] is the concrete
//! implementation used by the CLI and the tests.
//!
//! Insert operations report a constraint rejection (duplicate edge, missing
//! endpoint, duplicate occurrence number) as `Ok(None)` rather than an
//! error, so callers can surface it as a persistence failure.
//!
//! Writes that must see a consistent project (a checked edge insert) or that
//! touch more than one table (a materialized instance) run in a single
//! `BEGIN IMMEDIATE` transaction. SQLite hands out one write lock per
//! database file, so these units are serialized across processes too.

use std::collections::HashMap;
use std::future::Future;

use crate::db::models::{Dependency, RecurrencePattern, RecurringTaskInstance, Task};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

pub trait TaskStore: Send + Sync {
    // ── Dependency edges ────────────────────────────────────────────

    fn create_task_dependency(
        &self,
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> impl Future<Output = Result<Option<Dependency>>> + Send;

    /// Insert an edge only if `check` accepts the project's tasks as they
    /// stand inside the same write transaction. An error from `check` rolls
    /// the transaction back and is returned as is.
    fn create_checked_task_dependency<F>(
        &self,
        project_id: &str,
        dependent_task_id: &str,
        blocking_task_id: &str,
        check: F,
    ) -> impl Future<Output = Result<Option<Dependency>>> + Send
    where
        F: FnOnce(&[Task]) -> Result<()> + Send;

    fn delete_task_dependency(
        &self,
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove every edge touching `task_id`, in either direction.
    fn delete_all_task_dependencies(&self, task_id: &str)
        -> impl Future<Output = Result<bool>> + Send;

    /// Edges where `task_id` is the dependent.
    fn get_task_dependencies(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Vec<Dependency>>> + Send;

    /// Tasks blocked by `task_id`.
    fn get_dependent_tasks(&self, task_id: &str) -> impl Future<Output = Result<Vec<Task>>> + Send;

    // ── Recurring instances ─────────────────────────────────────────

    fn create_recurring_task_instance(
        &self,
        template_task_id: &str,
        generated_task_id: &str,
        occurrence_number: u32,
        scheduled_date: &str,
    ) -> impl Future<Output = Result<Option<RecurringTaskInstance>>> + Send;

    /// Persist a generated task together with its instance record. Either
    /// both rows land or neither does.
    fn create_materialized_instance(
        &self,
        generated_task: &Task,
        template_task_id: &str,
        occurrence_number: u32,
        scheduled_date: &str,
    ) -> impl Future<Output = Result<Option<(Task, RecurringTaskInstance)>>> + Send;

    fn get_recurring_task_instances(
        &self,
        template_task_id: &str,
    ) -> impl Future<Output = Result<Vec<RecurringTaskInstance>>> + Send;

    fn get_latest_recurring_task_instance(
        &self,
        template_task_id: &str,
    ) -> impl Future<Output = Result<Option<RecurringTaskInstance>>> + Send;

    fn delete_all_recurring_task_instances(
        &self,
        template_task_id: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Insert a task. Edge lists on `task` are ignored; edges are only
    /// written through the dependency operations.
    fn create_task(&self, task: &Task) -> impl Future<Output = Result<Task>> + Send;

    fn get_task(&self, id: &str) -> impl Future<Output = Result<Option<Task>>> + Send;

    fn list_project_tasks(&self, project_id: &str)
        -> impl Future<Output = Result<Vec<Task>>> + Send;

    fn update_task(&self, task: &Task) -> impl Future<Output = Result<Task>> + Send;

    fn delete_task(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    project_id: String,
    name: String,
    description: Option<String>,
    status: String,
    completed: bool,
    priority: Option<i32>,
    due_date: Option<String>,
    start_date: Option<String>,
    is_recurring: bool,
    recurrence_pattern: Option<String>,
    original_task_id: Option<String>,
    occurrence_number: Option<u32>,
    created_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task> {
        let recurrence_pattern = self
            .recurrence_pattern
            .as_deref()
            .map(serde_json::from_str::<RecurrencePattern>)
            .transpose()?;

        Ok(Task {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            status: self.status,
            completed: self.completed,
            priority: self.priority,
            due_date: self.due_date,
            start_date: self.start_date,
            dependencies: Vec::new(),
            dependent_task_ids: Vec::new(),
            is_blocked: false,
            is_recurring: self.is_recurring,
            recurrence_pattern,
            original_task_id: self.original_task_id,
            occurrence_number: self.occurrence_number,
            created_at: self.created_at,
        })
    }
}

const TASK_COLUMNS: &str = "id, project_id, name, description, status, completed, priority, \
    due_date, start_date, is_recurring, recurrence_pattern, original_task_id, \
    occurrence_number, created_at";

const DEPENDENCY_COLUMNS: &str = "id, dependent_task_id, blocking_task_id, created_at";

const INSTANCE_COLUMNS: &str =
    "id, template_task_id, generated_task_id, occurrence_number, scheduled_date, created_at";

/// Takes the database write lock up front, so the reads that follow see
/// the state the write will apply to.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

fn is_constraint_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
        },
        _ => false,
    }
}

/// Fill `dependencies` / `dependent_task_ids` on `tasks` from `edges`.
fn attach_edges(tasks: &mut [Task], edges: &[Dependency]) {
    let index: HashMap<String, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();

    for edge in edges {
        if let Some(&i) = index.get(&edge.dependent_task_id) {
            if !tasks[i].dependencies.contains(&edge.blocking_task_id) {
                tasks[i].dependencies.push(edge.blocking_task_id.clone());
            }
        }
        if let Some(&i) = index.get(&edge.blocking_task_id) {
            if !tasks[i].dependent_task_ids.contains(&edge.dependent_task_id) {
                tasks[i].dependent_task_ids.push(edge.dependent_task_id.clone());
            }
        }
    }
}

// ── Connection-level queries ────────────────────────────────────────
//
// Shared by the pooled methods and the transactional ones.

async fn fetch_edges_touching(conn: &mut SqliteConnection, task_id: &str) -> Result<Vec<Dependency>> {
    let edges = sqlx::query_as::<_, Dependency>(&format!(
        "SELECT {} FROM task_dependencies \
         WHERE dependent_task_id = ? OR blocking_task_id = ? ORDER BY id",
        DEPENDENCY_COLUMNS
    ))
    .bind(task_id)
    .bind(task_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(edges)
}

async fn fetch_task(conn: &mut SqliteConnection, id: &str) -> Result<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {} FROM tasks WHERE id = ?",
        TASK_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut task = row.into_task()?;
    let edges = fetch_edges_touching(conn, id).await?;
    attach_edges(std::slice::from_mut(&mut task), &edges);

    Ok(Some(task))
}

async fn fetch_project_tasks(conn: &mut SqliteConnection, project_id: &str) -> Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {} FROM tasks WHERE project_id = ? ORDER BY created_at, id",
        TASK_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut tasks = rows
        .into_iter()
        .map(TaskRow::into_task)
        .collect::<Result<Vec<_>>>()?;

    let edges = sqlx::query_as::<_, Dependency>(&format!(
        "SELECT {} FROM task_dependencies \
         WHERE dependent_task_id IN (SELECT id FROM tasks WHERE project_id = ?) \
            OR blocking_task_id IN (SELECT id FROM tasks WHERE project_id = ?) \
         ORDER BY id",
        DEPENDENCY_COLUMNS
    ))
    .bind(project_id)
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    attach_edges(&mut tasks, &edges);
    Ok(tasks)
}

async fn insert_dependency(
    conn: &mut SqliteConnection,
    dependent_task_id: &str,
    blocking_task_id: &str,
) -> Result<Option<Dependency>> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO task_dependencies (dependent_task_id, blocking_task_id, created_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(dependent_task_id)
    .bind(blocking_task_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await;

    let dependency_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(e) if is_constraint_violation(&e) => {
            tracing::warn!(
                dependent_task_id,
                blocking_task_id,
                error = %e,
                "Dependency rejected by storage constraint"
            );
            return Ok(None);
        },
        Err(e) => return Err(e.into()),
    };

    let dependency = sqlx::query_as::<_, Dependency>(&format!(
        "SELECT {} FROM task_dependencies WHERE id = ?",
        DEPENDENCY_COLUMNS
    ))
    .bind(dependency_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Some(dependency))
}

async fn insert_instance(
    conn: &mut SqliteConnection,
    template_task_id: &str,
    generated_task_id: &str,
    occurrence_number: u32,
    scheduled_date: &str,
) -> Result<Option<RecurringTaskInstance>> {
    let id = Uuid::new_v4().to_string();

    let inserted = sqlx::query(
        r#"
        INSERT INTO recurring_task_instances
            (id, template_task_id, generated_task_id, occurrence_number, scheduled_date, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(template_task_id)
    .bind(generated_task_id)
    .bind(occurrence_number)
    .bind(scheduled_date)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => {},
        Err(e) if is_constraint_violation(&e) => {
            tracing::warn!(
                template_task_id,
                occurrence_number,
                error = %e,
                "Recurring instance rejected by storage constraint"
            );
            return Ok(None);
        },
        Err(e) => return Err(e.into()),
    }

    let instance = sqlx::query_as::<_, RecurringTaskInstance>(&format!(
        "SELECT {} FROM recurring_task_instances WHERE id = ?",
        INSTANCE_COLUMNS
    ))
    .bind(&id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Some(instance))
}

async fn insert_task(conn: &mut SqliteConnection, task: &Task) -> Result<()> {
    let pattern = task
        .recurrence_pattern
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO tasks (id, project_id, name, description, status, completed, priority,
                           due_date, start_date, is_recurring, recurrence_pattern,
                           original_task_id, occurrence_number, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.id)
    .bind(&task.project_id)
    .bind(&task.name)
    .bind(&task.description)
    .bind(&task.status)
    .bind(task.completed)
    .bind(task.priority)
    .bind(&task.due_date)
    .bind(&task.start_date)
    .bind(task.is_recurring)
    .bind(pattern)
    .bind(&task.original_task_id)
    .bind(task.occurrence_number)
    .bind(task.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl TaskStore for SqliteTaskStore {
    async fn create_task_dependency(
        &self,
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> Result<Option<Dependency>> {
        let mut conn = self.pool.acquire().await?;
        insert_dependency(&mut *conn, dependent_task_id, blocking_task_id).await
    }

    async fn create_checked_task_dependency<F>(
        &self,
        project_id: &str,
        dependent_task_id: &str,
        blocking_task_id: &str,
        check: F,
    ) -> Result<Option<Dependency>>
    where
        F: FnOnce(&[Task]) -> Result<()> + Send,
    {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let tasks = fetch_project_tasks(&mut *tx, project_id).await?;
        if let Err(e) = check(&tasks) {
            tx.rollback().await?;
            return Err(e);
        }

        let Some(dependency) = insert_dependency(&mut *tx, dependent_task_id, blocking_task_id).await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some(dependency))
    }

    async fn delete_task_dependency(
        &self,
        dependent_task_id: &str,
        blocking_task_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM task_dependencies WHERE dependent_task_id = ? AND blocking_task_id = ?",
        )
        .bind(dependent_task_id)
        .bind(blocking_task_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_task_dependencies(&self, task_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM task_dependencies WHERE dependent_task_id = ? OR blocking_task_id = ?",
        )
        .bind(task_id)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_task_dependencies(&self, task_id: &str) -> Result<Vec<Dependency>> {
        let edges = sqlx::query_as::<_, Dependency>(&format!(
            "SELECT {} FROM task_dependencies WHERE dependent_task_id = ? ORDER BY id",
            DEPENDENCY_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(edges)
    }

    async fn get_dependent_tasks(&self, task_id: &str) -> Result<Vec<Task>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE id IN \
             (SELECT dependent_task_id FROM task_dependencies WHERE blocking_task_id = ?) \
             ORDER BY created_at, id",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut tasks = rows
            .into_iter()
            .map(TaskRow::into_task)
            .collect::<Result<Vec<_>>>()?;

        for task in tasks.iter_mut() {
            let edges = fetch_edges_touching(&mut *conn, &task.id).await?;
            attach_edges(std::slice::from_mut(task), &edges);
        }

        Ok(tasks)
    }

    async fn create_recurring_task_instance(
        &self,
        template_task_id: &str,
        generated_task_id: &str,
        occurrence_number: u32,
        scheduled_date: &str,
    ) -> Result<Option<RecurringTaskInstance>> {
        let mut conn = self.pool.acquire().await?;
        insert_instance(
            &mut *conn,
            template_task_id,
            generated_task_id,
            occurrence_number,
            scheduled_date,
        )
        .await
    }

    async fn create_materialized_instance(
        &self,
        generated_task: &Task,
        template_task_id: &str,
        occurrence_number: u32,
        scheduled_date: &str,
    ) -> Result<Option<(Task, RecurringTaskInstance)>> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        match insert_task(&mut *tx, generated_task).await {
            Ok(()) => {},
            Err(EngineError::DatabaseError(e)) if is_constraint_violation(&e) => {
                tracing::warn!(
                    template_task_id,
                    occurrence_number,
                    error = %e,
                    "Generated task rejected by storage constraint"
                );
                tx.rollback().await?;
                return Ok(None);
            },
            Err(e) => return Err(e),
        }

        let Some(instance) = insert_instance(
            &mut *tx,
            template_task_id,
            &generated_task.id,
            occurrence_number,
            scheduled_date,
        )
        .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let task = fetch_task(&mut *tx, &generated_task.id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(generated_task.id.clone()))?;

        tx.commit().await?;
        Ok(Some((task, instance)))
    }

    async fn get_recurring_task_instances(
        &self,
        template_task_id: &str,
    ) -> Result<Vec<RecurringTaskInstance>> {
        let instances = sqlx::query_as::<_, RecurringTaskInstance>(&format!(
            "SELECT {} FROM recurring_task_instances WHERE template_task_id = ? \
             ORDER BY occurrence_number",
            INSTANCE_COLUMNS
        ))
        .bind(template_task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(instances)
    }

    async fn get_latest_recurring_task_instance(
        &self,
        template_task_id: &str,
    ) -> Result<Option<RecurringTaskInstance>> {
        let instance = sqlx::query_as::<_, RecurringTaskInstance>(&format!(
            "SELECT {} FROM recurring_task_instances WHERE template_task_id = ? \
             ORDER BY occurrence_number DESC LIMIT 1",
            INSTANCE_COLUMNS
        ))
        .bind(template_task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(instance)
    }

    async fn delete_all_recurring_task_instances(&self, template_task_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM recurring_task_instances WHERE template_task_id = ?")
            .bind(template_task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_task(&self, task: &Task) -> Result<Task> {
        let mut conn = self.pool.acquire().await?;
        insert_task(&mut *conn, task).await?;

        fetch_task(&mut *conn, &task.id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task.id.clone()))
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let mut conn = self.pool.acquire().await?;
        fetch_task(&mut *conn, id).await
    }

    async fn list_project_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        let mut conn = self.pool.acquire().await?;
        fetch_project_tasks(&mut *conn, project_id).await
    }

    async fn update_task(&self, task: &Task) -> Result<Task> {
        let pattern = task
            .recurrence_pattern
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET name = ?, description = ?, status = ?, completed = ?, priority = ?,
                due_date = ?, start_date = ?, is_recurring = ?, recurrence_pattern = ?,
                original_task_id = ?, occurrence_number = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.status)
        .bind(task.completed)
        .bind(task.priority)
        .bind(&task.due_date)
        .bind(&task.start_date)
        .bind(task.is_recurring)
        .bind(pattern)
        .bind(&task.original_task_id)
        .bind(task.occurrence_number)
        .bind(&task.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::TaskNotFound(task.id.clone()));
        }

        fetch_task(&mut *conn, &task.id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task.id.clone()))
    }

    async fn delete_task(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
