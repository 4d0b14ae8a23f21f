use std::sync::Arc;

/// Progress notifications emitted while a request is being fulfilled.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    CandidatesResolved {
        providers: Vec<String>,
    },
    AttemptStarted {
        provider: String,
        attempt: u32,
        timeout_ms: u64,
    },
    AttemptFailed {
        provider: String,
        attempt: u32,
        error: String,
        retryable: bool,
    },
    BackingOff {
        provider: String,
        attempt: u32,
        delay_ms: u64,
    },
    ProviderExhausted {
        provider: String,
    },
    Succeeded {
        provider: String,
        attempt: u32,
    },
    ParallelDispatched {
        providers: Vec<String>,
    },
    ParallelSettled {
        succeeded: Vec<String>,
        failed: Vec<String>,
    },
}

/// Observer passed explicitly with each call.
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;
