#[cfg(test)]
pub mod test_helpers {
    use crate::db::models::Task;
    use crate::db::{create_pool, run_migrations};
    use crate::storage::{SqliteTaskStore, TaskStore};
    use sqlx::SqlitePool;
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub struct TestContext {
        pub pool: SqlitePool,
        pub _temp_dir: TempDir,
    }

    impl TestContext {
        pub async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();

            let data_dir = temp_dir.path().join(".taskflow");
            std::fs::create_dir_all(&data_dir).unwrap();

            let db_path = data_dir.join("project.db");

            let pool = create_pool(&db_path).await.unwrap();
            run_migrations(&pool).await.unwrap();

            Self {
                pool,
                _temp_dir: temp_dir,
            }
        }

        pub fn pool(&self) -> &SqlitePool {
            &self.pool
        }

        pub fn store(&self) -> SqliteTaskStore {
            SqliteTaskStore::new(self.pool.clone())
        }

        /// Path of the database file, for opening a second pool on it.
        pub fn db_path(&self) -> PathBuf {
            self._temp_dir.path().join(".taskflow").join("project.db")
        }

        /// Persist a plain task named after its id.
        pub async fn add_task(&self, id: &str, project_id: &str) -> Task {
            self.store()
                .create_task(&Task::new(id, project_id, id))
                .await
                .unwrap()
        }
    }
}
