use thiserror::Error;
use uuid::Uuid;

/// Errors from job store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("storage task failed: {0}")]
    Task(String),
}

/// Errors from cron expression parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid cron field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}
