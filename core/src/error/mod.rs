pub mod code;
pub mod orchestrator;
pub mod task;

pub use code::ErrorCode;
pub use orchestrator::{OrchestratorError, ProbeError, RecognitionError};
pub use task::TaskError;
