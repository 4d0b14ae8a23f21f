use thiserror::Error;

use super::code::ErrorCode;

/// Terminal failure of a scheduled task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("task cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    #[error("invalid task timeout: must be greater than 0")]
    InvalidTimeout,

    #[error("scheduler dropped the task before it settled")]
    SchedulerClosed,
}

impl TaskError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Failed(_) => ErrorCode::GeneralError,
            Self::InvalidTimeout => ErrorCode::ValidationError,
            Self::SchedulerClosed => ErrorCode::GeneralError,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
