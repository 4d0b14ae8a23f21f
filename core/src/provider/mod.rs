//! Providers, the runtime registry, and the orchestrator that turns one
//! logical request into one reliable response.

mod merge;
mod orchestrator;
mod progress;
mod registry;
mod retry;
mod traits;
mod types;

pub use merge::{
    average_confidence, combine_content, dedup_sources, merge_responses, MergedResult,
    DEFAULT_CONFIDENCE,
};
pub use orchestrator::{order_candidates, FulfillOptions, Fulfillment, ProviderOrchestrator};
pub use progress::{ProgressCallback, ProgressUpdate};
pub use registry::ProviderRegistry;
pub use retry::{attempt_timeout_ms, is_retryable_error, ExponentialBackoff, RetryPolicy};
pub use traits::Provider;
pub use types::{Locality, ProviderRequest, Response, Source};
