use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{RoutingConfig, RoutingMode};
use crate::connectivity::ConnectivityGate;
use crate::error::{OrchestratorError, TaskError};
use crate::provider::{Locality, Provider, ProviderRegistry, ProviderRequest, Response};
use crate::scheduler::{Scheduler, TaskOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Offline,
    Online,
}

/// Observable states of one routed request:
/// `Idle -> Attempting(primary) -> {Succeeded | Attempting(fallback) -> {Succeeded | Failed}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteState {
    Idle,
    Attempting { backend: Backend, provider: String },
    Succeeded { backend: Backend, provider: String },
    Failed { error: String },
}

pub type RouteObserver = Arc<dyn Fn(&RouteState) + Send + Sync>;

#[derive(Clone, Default)]
pub struct RouteOptions {
    /// Cancel every pending/running task of the same kind before routing.
    pub supersede: bool,
    pub priority: Option<i32>,
    pub signal: Option<CancellationToken>,
    pub on_state: Option<RouteObserver>,
}

impl RouteOptions {
    pub fn superseding() -> Self {
        Self {
            supersede: true,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_observer(mut self, on_state: RouteObserver) -> Self {
        self.on_state = Some(on_state);
        self
    }

    fn check_cancelled(&self) -> Result<(), OrchestratorError> {
        match &self.signal {
            Some(signal) if signal.is_cancelled() => Err(OrchestratorError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Offline/online routing shared by the OCR and AI pipelines.
///
/// The offline backend is the registry entry named by
/// `routing.offline_provider`, or the first local provider. Every other
/// remote provider is an online backend, tried in registration order.
pub struct HybridRouter {
    registry: Arc<ProviderRegistry>,
    scheduler: Scheduler,
    gate: Arc<ConnectivityGate>,
    config: RoutingConfig,
}

impl HybridRouter {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        scheduler: Scheduler,
        gate: Arc<ConnectivityGate>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            registry,
            scheduler,
            gate,
            config,
        }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn offline_backend(&self) -> Option<Arc<dyn Provider>> {
        match &self.config.offline_provider {
            Some(name) => self.registry.get(name),
            None => self.registry.by_locality(Locality::Local).into_iter().next(),
        }
    }

    pub fn online_backends(&self) -> Vec<Arc<dyn Provider>> {
        let offline = self.offline_backend();
        let offline_name = offline.as_ref().map(|p| p.name());
        self.registry
            .by_locality(Locality::Remote)
            .into_iter()
            .filter(|p| Some(p.name()) != offline_name)
            .collect()
    }

    pub async fn route(
        &self,
        request: &ProviderRequest,
        options: &RouteOptions,
    ) -> Result<Response, OrchestratorError> {
        if options.supersede {
            let cancelled = self.scheduler.cancel_by_kind(&request.kind);
            if cancelled > 0 {
                tracing::debug!(target: "lumen.routing", kind = %request.kind, cancelled, "superseded stale requests");
            }
        }
        self.report(options, RouteState::Idle);

        let result = self.run(request, options).await;
        match &result {
            Ok(response) => tracing::info!(
                target: "lumen.routing",
                kind = %request.kind,
                provider = %response.provider,
                "request routed"
            ),
            Err(err) => {
                tracing::warn!(target: "lumen.routing", kind = %request.kind, error = %err, "routing failed");
                self.report(
                    options,
                    RouteState::Failed {
                        error: err.last_cause(),
                    },
                );
            }
        }
        result
    }

    async fn run(
        &self,
        request: &ProviderRequest,
        options: &RouteOptions,
    ) -> Result<Response, OrchestratorError> {
        match self.config.mode {
            RoutingMode::Offline => self.try_offline(request, options).await,
            RoutingMode::Online => self.try_online(request, options).await,
            RoutingMode::Auto if self.config.prefer_offline => {
                match self.try_offline(request, options).await {
                    Err(OrchestratorError::Cancelled) => Err(OrchestratorError::Cancelled),
                    Err(offline_err) => {
                        tracing::debug!(target: "lumen.routing", error = %offline_err, "offline failed, trying online");
                        match self.try_online(request, options).await {
                            Err(OrchestratorError::NoProvidersAvailable) => Err(offline_err),
                            other => other,
                        }
                    }
                    ok => ok,
                }
            }
            RoutingMode::Auto => {
                if !self.gate.is_online(false).await {
                    tracing::debug!(target: "lumen.routing", "offline verdict, using offline backend");
                    return self.try_offline(request, options).await;
                }
                match self.try_online(request, options).await {
                    Err(OrchestratorError::Cancelled) => Err(OrchestratorError::Cancelled),
                    Err(online_err) => match self.try_offline(request, options).await {
                        Err(OrchestratorError::NoProvidersAvailable) => Err(online_err),
                        other => other,
                    },
                    ok => ok,
                }
            }
        }
    }

    async fn try_offline(
        &self,
        request: &ProviderRequest,
        options: &RouteOptions,
    ) -> Result<Response, OrchestratorError> {
        options.check_cancelled()?;
        let provider = self
            .offline_backend()
            .ok_or(OrchestratorError::NoProvidersAvailable)?;
        self.attempt(Backend::Offline, &provider, request, options)
            .await
            .map_err(into_routing_error)
    }

    /// Each online backend in order, skipping those whose availability
    /// check fails or does not answer in time. Fails with the last online
    /// error, or `NoProvidersAvailable` if none was attempted.
    async fn try_online(
        &self,
        request: &ProviderRequest,
        options: &RouteOptions,
    ) -> Result<Response, OrchestratorError> {
        let availability_timeout = Duration::from_millis(self.config.availability_timeout_ms);
        let mut last_error = None;

        for provider in self.online_backends() {
            options.check_cancelled()?;
            let available = tokio::time::timeout(availability_timeout, provider.is_available())
                .await
                .unwrap_or(false);
            if !available {
                tracing::debug!(target: "lumen.routing", provider = provider.name(), "skipping unavailable provider");
                continue;
            }

            match self.attempt(Backend::Online, &provider, request, options).await {
                Ok(response) => return Ok(response),
                Err(TaskError::Cancelled) => return Err(OrchestratorError::Cancelled),
                Err(err) => {
                    tracing::warn!(target: "lumen.routing", provider = provider.name(), error = %err, "online attempt failed");
                    last_error = Some(err.to_string());
                }
            }
        }

        match last_error {
            Some(last_error) => Err(OrchestratorError::AllProvidersFailed { last_error }),
            None => Err(OrchestratorError::NoProvidersAvailable),
        }
    }

    async fn attempt(
        &self,
        backend: Backend,
        provider: &Arc<dyn Provider>,
        request: &ProviderRequest,
        options: &RouteOptions,
    ) -> Result<Response, TaskError> {
        let name = provider.name().to_string();
        self.report(
            options,
            RouteState::Attempting {
                backend,
                provider: name.clone(),
            },
        );

        let mut task_options =
            TaskOptions::default().with_timeout_ms(self.config.attempt_timeout_ms);
        if let Some(priority) = options.priority {
            task_options = task_options.with_priority(priority);
        }
        if let Some(signal) = &options.signal {
            task_options = task_options.with_signal(signal.clone());
        }

        let provider = Arc::clone(provider);
        let req = request.clone();
        let response = self
            .scheduler
            .submit(
                request.kind.clone(),
                move |token| async move { provider.send_request(&req, token).await },
                task_options,
            )?
            .join()
            .await?;

        self.report(
            options,
            RouteState::Succeeded {
                backend,
                provider: name,
            },
        );
        Ok(response)
    }

    fn report(&self, options: &RouteOptions, state: RouteState) {
        tracing::trace!(target: "lumen.routing", state = ?state);
        if let Some(cb) = &options.on_state {
            cb(&state);
        }
    }
}

fn into_routing_error(err: TaskError) -> OrchestratorError {
    match err {
        TaskError::Cancelled => OrchestratorError::Cancelled,
        other => OrchestratorError::AllProvidersFailed {
            last_error: other.to_string(),
        },
    }
}
