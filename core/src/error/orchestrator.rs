use thiserror::Error;

use super::code::ErrorCode;
use super::task::TaskError;

/// Errors surfaced by the provider orchestrator and the hybrid router.
///
/// Retryable provider failures never appear here individually; callers only
/// see the aggregate once every candidate has been exhausted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("provider not registered: {0}")]
    ProviderNotRegistered(String),

    #[error("no providers available")]
    NoProvidersAvailable,

    #[error("all providers failed: {last_error}")]
    AllProvidersFailed { last_error: String },

    #[error("all parallel requests failed")]
    AllParallelRequestsFailed,

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("task error: {0}")]
    Task(#[from] TaskError),
}

impl OrchestratorError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ProviderNotRegistered(_) => ErrorCode::ProviderNotRegistered,
            Self::NoProvidersAvailable => ErrorCode::NoProvidersAvailable,
            Self::AllProvidersFailed { .. } => ErrorCode::AllProvidersFailed,
            Self::AllParallelRequestsFailed => ErrorCode::AllParallelRequestsFailed,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InvalidStrategy(_) => ErrorCode::ValidationError,
            Self::Task(e) => e.error_code(),
        }
    }

    /// The most concrete cause string available for diagnostics.
    pub fn last_cause(&self) -> String {
        match self {
            Self::AllProvidersFailed { last_error } => last_error.clone(),
            other => other.to_string(),
        }
    }
}

/// Failure of a reachability probe. Never surfaced to callers of the gate;
/// it only turns into `is_online == false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("connectivity probe timed out after {0}ms")]
    Timeout(u64),

    #[error("connectivity probe failed: {0}")]
    Request(String),
}

impl ProbeError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Request(_) => ErrorCode::NetworkError,
        }
    }
}

/// OCR-facing error returned by `HybridRouter::recognize`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    #[error("recognition failed: {cause}")]
    RecognitionFailed { cause: String },

    #[error("recognition cancelled")]
    Cancelled,

    #[error("invalid image payload: {0}")]
    InvalidImage(String),
}

impl RecognitionError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::RecognitionFailed { .. } => ErrorCode::RecognitionFailed,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InvalidImage(_) => ErrorCode::ValidationError,
        }
    }
}

impl From<OrchestratorError> for RecognitionError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Cancelled | OrchestratorError::Task(TaskError::Cancelled) => {
                Self::Cancelled
            }
            other => Self::RecognitionFailed {
                cause: other.last_cause(),
            },
        }
    }
}
