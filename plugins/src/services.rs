//! Composition root shared by the CLI: one scheduler, registry and gate
//! wired into the orchestrator and the hybrid router.
use std::sync::Arc;

use anyhow::Result;

use lumen_core::config::AppConfig;
use lumen_core::connectivity::ConnectivityGate;
use lumen_core::provider::{ProviderOrchestrator, ProviderRegistry};
use lumen_core::routing::HybridRouter;
use lumen_core::scheduler::Scheduler;

use crate::factory;

pub struct Services {
    pub registry: Arc<ProviderRegistry>,
    pub scheduler: Scheduler,
    pub gate: Arc<ConnectivityGate>,
    pub orchestrator: ProviderOrchestrator,
    pub router: HybridRouter,
}

impl Services {
    pub fn build(cfg: &AppConfig) -> Result<Self> {
        cfg.strategy.validate().map_err(anyhow::Error::msg)?;

        let registry = factory::build_registry(cfg)?;
        let scheduler = factory::build_scheduler(cfg);
        let gate = factory::build_gate(cfg)?;
        let orchestrator = factory::build_orchestrator(
            cfg,
            Arc::clone(&registry),
            scheduler.clone(),
            Arc::clone(&gate),
        );
        let router = factory::build_router(
            cfg,
            Arc::clone(&registry),
            scheduler.clone(),
            Arc::clone(&gate),
        );
        tracing::debug!(
            target: "lumen.orchestrator",
            providers = registry.len(),
            max_concurrent = scheduler.capacity(),
            "services built"
        );

        Ok(Self {
            registry,
            scheduler,
            gate,
            orchestrator,
            router,
        })
    }
}
