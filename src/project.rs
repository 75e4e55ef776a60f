use crate::db::{create_pool, run_migrations};
use crate::error::{EngineError, Result};
use crate::locks::KeyedLocks;
use crate::storage::SqliteTaskStore;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

pub const DATA_DIR: &str = ".taskflow";
pub const DB_FILE: &str = "project.db";
pub const PROJECT_DIR_ENV: &str = "TASKFLOW_PROJECT_DIR";

/// An opened `.taskflow/project.db` plus the process-wide mutation locks.
#[derive(Debug)]
pub struct ProjectContext {
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub pool: SqlitePool,
    pub locks: KeyedLocks,
}

fn has_data_dir(path: &Path) -> bool {
    path.join(DATA_DIR).is_dir()
}

impl ProjectContext {
    /// Locate the directory holding `.taskflow/`.
    ///
    /// `TASKFLOW_PROJECT_DIR` wins when it points at an initialized
    /// directory; otherwise search upwards from the current directory.
    pub fn find_project_root() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(PROJECT_DIR_ENV) {
            let path = PathBuf::from(env_path);
            if has_data_dir(&path) {
                tracing::debug!(root = %path.display(), "Using project from {}", PROJECT_DIR_ENV);
                return Some(path);
            }
            tracing::debug!(
                root = %path.display(),
                "{} set but no {} directory found",
                PROJECT_DIR_ENV,
                DATA_DIR
            );
        }

        let mut current = std::env::current_dir().ok()?;
        loop {
            if has_data_dir(&current) {
                return Some(current);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    async fn open(root: PathBuf) -> Result<Self> {
        let db_path = root.join(DATA_DIR).join(DB_FILE);
        let pool = create_pool(&db_path).await?;
        run_migrations(&pool).await?;

        Ok(ProjectContext {
            root,
            db_path,
            pool,
            locks: KeyedLocks::new(),
        })
    }

    /// Create `.taskflow/project.db` under `root` (or the environment
    /// override, else the current directory).
    pub async fn initialize_project() -> Result<Self> {
        let root = match std::env::var(PROJECT_DIR_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => std::env::current_dir()?,
        };

        std::fs::create_dir_all(root.join(DATA_DIR))?;
        crate::log_task_operation!("init_project", root.display());
        Self::open(root).await
    }

    /// Load an existing project context
    pub async fn load() -> Result<Self> {
        let root = Self::find_project_root().ok_or(EngineError::NotAProject)?;
        Self::open(root).await
    }

    /// Load project context, initializing if necessary (for write commands)
    pub async fn load_or_init() -> Result<Self> {
        match Self::load().await {
            Ok(ctx) => Ok(ctx),
            Err(EngineError::NotAProject) => Self::initialize_project().await,
            Err(e) => Err(e),
        }
    }

    pub fn store(&self) -> SqliteTaskStore {
        SqliteTaskStore::new(self.pool.clone())
    }
}
