use lumen_core::error::{ErrorCode, OrchestratorError, RecognitionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("{0}")]
    Recognition(#[from] RecognitionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Orchestrator(e) => e.error_code(),
            Self::Recognition(e) => e.error_code(),
            Self::Io(_) | Self::Command(_) | Self::Anyhow(_) => ErrorCode::GeneralError,
        }
    }

    pub fn exit_code(&self) -> i32 {
        // 0: success
        // 11: config error
        // 20: io / command error
        // 30: no usable provider
        // 31: every provider failed
        // 130: cancelled (Ctrl-C)
        // 50: internal/uncategorized
        match self.error_code() {
            ErrorCode::Success => 0,
            ErrorCode::ConfigError | ErrorCode::ValidationError => 11,
            ErrorCode::ProviderNotRegistered | ErrorCode::NoProvidersAvailable => 30,
            ErrorCode::AllProvidersFailed
            | ErrorCode::AllParallelRequestsFailed
            | ErrorCode::RecognitionFailed
            | ErrorCode::Timeout
            | ErrorCode::NetworkError => 31,
            ErrorCode::Cancelled => 130,
            ErrorCode::GeneralError => match self {
                Self::Io(_) | Self::Command(_) => 20,
                _ => 50,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exit_codes() {
        assert_eq!(CliError::Config("bad".into()).exit_code(), 11);
        assert_eq!(
            CliError::from(OrchestratorError::NoProvidersAvailable).exit_code(),
            30
        );
        assert_eq!(
            CliError::from(OrchestratorError::AllProvidersFailed {
                last_error: "HTTP 503".into()
            })
            .exit_code(),
            31
        );
        assert_eq!(CliError::from(OrchestratorError::Cancelled).exit_code(), 130);
        assert_eq!(CliError::Command("x".into()).exit_code(), 20);
        assert_eq!(CliError::from(anyhow::anyhow!("boom")).exit_code(), 50);
    }
}
