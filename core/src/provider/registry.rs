use std::sync::{Arc, PoisonError, RwLock};

use crate::error::OrchestratorError;

use super::traits::Provider;
use super::types::Locality;

/// Runtime-mutable set of providers, kept in registration order.
///
/// Owned by the composition root and shared with the orchestrator and the
/// hybrid router; nothing assumes the provider count is fixed.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider`. A provider with the same name is replaced in
    /// place (keeping its position) and returned.
    pub fn register(&self, provider: Arc<dyn Provider>) -> Option<Arc<dyn Provider>> {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(target: "lumen.orchestrator", provider = provider.name(), "provider registered");
        match providers.iter().position(|p| p.name() == provider.name()) {
            Some(pos) => Some(std::mem::replace(&mut providers[pos], provider)),
            None => {
                providers.push(provider);
                None
            }
        }
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        let pos = providers.iter().position(|p| p.name() == name)?;
        tracing::debug!(target: "lumen.orchestrator", provider = name, "provider unregistered");
        Some(providers.remove(pos))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.read().iter().find(|p| p.name() == name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<dyn Provider>, OrchestratorError> {
        self.get(name)
            .ok_or_else(|| OrchestratorError::ProviderNotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().iter().any(|p| p.name() == name)
    }

    /// Point-in-time copy in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn Provider>> {
        self.read().clone()
    }

    pub fn by_locality(&self, locality: Locality) -> Vec<Arc<dyn Provider>> {
        self.read()
            .iter()
            .filter(|p| p.locality() == locality)
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Provider>>> {
        self.providers.read().unwrap_or_else(PoisonError::into_inner)
    }
}
