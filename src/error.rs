use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid recurrence pattern: {0}")]
    InvalidPattern(String),

    #[error("A task cannot depend on itself")]
    SelfDependency,

    #[error("Circular dependency detected: {}", format_cycles(.cycles))]
    CircularDependency { cycles: Vec<Vec<String>> },

    #[error("Task {task_id} is blocked by incomplete tasks: {blocking:?}")]
    TaskBlocked {
        task_id: String,
        blocking: Vec<String>,
    },

    #[error("Task {0} is not a recurring template")]
    NotATemplate(String),

    #[error("Failed to persist {0}")]
    PersistenceFailed(String),

    #[error("Current directory is not a taskflow project")]
    NotAProject,

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Date parse error: {0}")]
    DateParseError(#[from] chrono::ParseError),
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" → "))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl EngineError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            EngineError::TaskNotFound(_) => "TASK_NOT_FOUND",
            EngineError::DatabaseError(_) => "DATABASE_ERROR",
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::InvalidPattern(_) => "INVALID_PATTERN",
            EngineError::SelfDependency => "SELF_DEPENDENCY",
            EngineError::CircularDependency { .. } => "CIRCULAR_DEPENDENCY",
            EngineError::TaskBlocked { .. } => "TASK_BLOCKED",
            EngineError::NotATemplate(_) => "NOT_A_TEMPLATE",
            EngineError::PersistenceFailed(_) => "PERSISTENCE_FAILED",
            EngineError::NotAProject => "NOT_A_PROJECT",
            EngineError::DateParseError(_) => "INVALID_DATE",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
