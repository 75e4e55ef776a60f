pub mod models;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'todo',
            completed INTEGER NOT NULL DEFAULT 0,
            priority INTEGER,
            due_date TEXT,
            start_date TEXT,
            is_recurring INTEGER NOT NULL DEFAULT 0,
            recurrence_pattern TEXT,
            original_task_id TEXT,
            occurrence_number INTEGER,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (status IN ('todo', 'doing', 'done'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks(project_id)")
        .execute(pool)
        .await?;

    // Edges: dependent_task_id is blocked by blocking_task_id.
    // Deleting either endpoint removes the edge.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_dependencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dependent_task_id TEXT NOT NULL,
            blocking_task_id TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (dependent_task_id) REFERENCES tasks(id) ON DELETE CASCADE,
            FOREIGN KEY (blocking_task_id) REFERENCES tasks(id) ON DELETE CASCADE,
            UNIQUE (dependent_task_id, blocking_task_id),
            CHECK (dependent_task_id != blocking_task_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_task_dependencies_blocking
        ON task_dependencies(blocking_task_id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_task_dependencies_dependent
        ON task_dependencies(dependent_task_id)
        "#,
    )
    .execute(pool)
    .await?;

    // One row per materialized occurrence. The unique pair makes a duplicate
    // concurrent materialization fail here instead of creating two #1s.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recurring_task_instances (
            id TEXT PRIMARY KEY,
            template_task_id TEXT NOT NULL,
            generated_task_id TEXT NOT NULL,
            occurrence_number INTEGER NOT NULL,
            scheduled_date TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (template_task_id) REFERENCES tasks(id) ON DELETE CASCADE,
            UNIQUE (template_task_id, occurrence_number),
            CHECK (occurrence_number >= 1)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO config (key, value)
        VALUES ('schema_version', '1')
        ON CONFLICT(key) DO NOTHING
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
