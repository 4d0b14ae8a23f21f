use std::sync::Arc;

use anyhow::Result;

use lumen_core::config::{AppConfig, ProviderConfig};
use lumen_core::connectivity::ConnectivityGate;
use lumen_core::provider::{Provider, ProviderOrchestrator, ProviderRegistry};
use lumen_core::routing::HybridRouter;
use lumen_core::scheduler::Scheduler;

use crate::connectivity::HttpProbe;
use crate::provider::{CommandProvider, HttpProvider};

pub fn build_provider(cfg: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    match cfg {
        ProviderConfig::Http(http) => Ok(Arc::new(HttpProvider::new(http)?)),
        ProviderConfig::Command(cmd) => Ok(Arc::new(CommandProvider::new(cmd))),
    }
}

pub fn build_registry(cfg: &AppConfig) -> Result<Arc<ProviderRegistry>> {
    let registry = ProviderRegistry::new();
    for provider in &cfg.providers {
        if registry.register(build_provider(provider)?).is_some() {
            tracing::warn!(target: "lumen.orchestrator", provider = provider.name(), "duplicate provider name, later entry wins");
        }
    }
    Ok(Arc::new(registry))
}

pub fn build_scheduler(cfg: &AppConfig) -> Scheduler {
    Scheduler::new(cfg.scheduler.clone())
}

pub fn build_gate(cfg: &AppConfig) -> Result<Arc<ConnectivityGate>> {
    let probe = HttpProbe::new(&cfg.connectivity)?;
    Ok(Arc::new(ConnectivityGate::new(
        Arc::new(probe),
        &cfg.connectivity,
    )))
}

pub fn build_orchestrator(
    cfg: &AppConfig,
    registry: Arc<ProviderRegistry>,
    scheduler: Scheduler,
    gate: Arc<ConnectivityGate>,
) -> ProviderOrchestrator {
    ProviderOrchestrator::new(registry, scheduler)
        .with_connectivity_gate(gate)
        .with_default_strategy(cfg.strategy.clone())
}

pub fn build_router(
    cfg: &AppConfig,
    registry: Arc<ProviderRegistry>,
    scheduler: Scheduler,
    gate: Arc<ConnectivityGate>,
) -> HybridRouter {
    HybridRouter::new(registry, scheduler, gate, cfg.routing.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::provider::Locality;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_registry_from_config() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [[providers]]
            type = "command"
            name = "tesseract"
            program = "tesseract"

            [[providers]]
            type = "http"
            name = "cloud"
            url = "https://api.example.com/v1/complete"
            "#,
        )
        .unwrap();

        let registry = build_registry(&cfg).unwrap();
        assert_eq!(registry.names(), vec!["tesseract", "cloud"]);
        assert_eq!(registry.by_locality(Locality::Local).len(), 1);
    }
}
