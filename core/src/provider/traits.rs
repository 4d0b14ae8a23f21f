use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::{Locality, ProviderRequest, Response};

/// An interchangeable backend able to fulfil a request: a local model, a
/// cloud AI vendor, or a local/online OCR engine.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    fn locality(&self) -> Locality {
        Locality::Remote
    }

    /// Cheap readiness check. Callers bound it with their own timeout.
    async fn is_available(&self) -> bool {
        true
    }

    /// Performs one attempt. Implementations should return promptly once
    /// `cancel` fires; error messages feed retry classification.
    async fn send_request(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<Response>;
}
