use async_trait::async_trait;

use crate::error::ProbeError;

/// Low-cost reachability check against a known-reachable endpoint. Any
/// response counts as success; payloads are ignored.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> Result<(), ProbeError>;
}
