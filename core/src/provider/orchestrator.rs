use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::Strategy;
use crate::connectivity::ConnectivityGate;
use crate::error::{OrchestratorError, TaskError};
use crate::scheduler::{Scheduler, TaskHandle, TaskOptions};

use super::merge::{merge_responses, MergedResult};
use super::progress::{ProgressCallback, ProgressUpdate};
use super::registry::ProviderRegistry;
use super::retry::{attempt_timeout_ms, ExponentialBackoff, RetryPolicy};
use super::traits::Provider;
use super::types::{Locality, ProviderRequest, Response};

/// Per-call options for [`ProviderOrchestrator`].
#[derive(Clone, Default)]
pub struct FulfillOptions {
    pub preferred_provider: Option<String>,
    /// Scheduler priority for every attempt of this call.
    pub priority: Option<i32>,
    /// Caller abort signal; aborts the whole fulfilment.
    pub signal: Option<CancellationToken>,
    pub on_progress: Option<ProgressCallback>,
}

impl FulfillOptions {
    pub fn with_preferred_provider(mut self, name: impl Into<String>) -> Self {
        self.preferred_provider = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    fn report(&self, update: ProgressUpdate) {
        if let Some(cb) = &self.on_progress {
            cb(&update);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Result of [`ProviderOrchestrator::fulfill`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fulfillment {
    Single(Response),
    Merged(MergedResult),
}

impl Fulfillment {
    pub fn content(&self) -> &str {
        match self {
            Self::Single(r) => &r.content,
            Self::Merged(m) => &m.combined,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Single(r) => &r.provider,
            Self::Merged(m) => &m.primary.provider,
        }
    }
}

/// Turns one logical request into one response across unreliable providers.
///
/// Every provider attempt runs as a scheduler task of the request's kind, so
/// concurrency, timeout and cancellation discipline is shared with all other
/// OCR and AI traffic.
pub struct ProviderOrchestrator {
    registry: Arc<ProviderRegistry>,
    scheduler: Scheduler,
    gate: Option<Arc<ConnectivityGate>>,
    default_strategy: Strategy,
}

impl ProviderOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, scheduler: Scheduler) -> Self {
        Self {
            registry,
            scheduler,
            gate: None,
            default_strategy: Strategy::default(),
        }
    }

    pub fn with_connectivity_gate(mut self, gate: Arc<ConnectivityGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_default_strategy(mut self, strategy: Strategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn default_strategy(&self) -> &Strategy {
        &self.default_strategy
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Sequential or parallel depending on `strategy.parallel_requests`.
    pub async fn fulfill(
        &self,
        request: &ProviderRequest,
        strategy: &Strategy,
        options: &FulfillOptions,
    ) -> Result<Fulfillment, OrchestratorError> {
        if strategy.parallel_requests {
            self.fulfill_parallel(request, strategy, None, options)
                .await
                .map(Fulfillment::Merged)
        } else {
            self.fulfill_sequential(request, strategy, options)
                .await
                .map(Fulfillment::Single)
        }
    }

    /// Tries candidates in order with per-provider retries; the first
    /// success wins.
    pub async fn fulfill_sequential(
        &self,
        request: &ProviderRequest,
        strategy: &Strategy,
        options: &FulfillOptions,
    ) -> Result<Response, OrchestratorError> {
        strategy.validate().map_err(OrchestratorError::InvalidStrategy)?;

        let candidates = self
            .sequential_candidates(strategy, options.preferred_provider.as_deref())
            .await;
        if candidates.is_empty() {
            tracing::warn!(target: "lumen.orchestrator", kind = %request.kind, "no eligible providers");
            return Err(OrchestratorError::NoProvidersAvailable);
        }
        options.report(ProgressUpdate::CandidatesResolved {
            providers: candidates.iter().map(|p| p.name().to_string()).collect(),
        });

        let policy = ExponentialBackoff::from_strategy(strategy);
        let mut last_error = String::new();

        for provider in &candidates {
            let name = provider.name().to_string();
            for attempt in 0..policy.max_attempts() {
                if options.is_cancelled() {
                    return Err(OrchestratorError::Cancelled);
                }
                let timeout_ms = attempt_timeout_ms(strategy.timeout_ms, attempt);
                options.report(ProgressUpdate::AttemptStarted {
                    provider: name.clone(),
                    attempt,
                    timeout_ms,
                });
                tracing::debug!(
                    target: "lumen.orchestrator",
                    provider = %name,
                    attempt,
                    timeout_ms,
                    "attempt started"
                );

                let err = match self.attempt(provider, request, timeout_ms, options).await {
                    Ok(response) => {
                        options.report(ProgressUpdate::Succeeded {
                            provider: name.clone(),
                            attempt,
                        });
                        tracing::info!(target: "lumen.orchestrator", provider = %name, attempt, "request fulfilled");
                        return Ok(response);
                    }
                    Err(TaskError::Cancelled) => return Err(OrchestratorError::Cancelled),
                    Err(err) => err.to_string(),
                };

                let retryable = policy.is_retryable(&err);
                tracing::warn!(
                    target: "lumen.orchestrator",
                    provider = %name,
                    attempt,
                    retryable,
                    error = %err,
                    "attempt failed"
                );
                options.report(ProgressUpdate::AttemptFailed {
                    provider: name.clone(),
                    attempt,
                    error: err.clone(),
                    retryable,
                });
                let retry = policy.should_retry(attempt, &err);
                last_error = err;
                if !retry {
                    break;
                }

                let delay = policy.next_delay(attempt);
                options.report(ProgressUpdate::BackingOff {
                    provider: name.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                backoff(delay, options.signal.as_ref()).await?;
            }
            options.report(ProgressUpdate::ProviderExhausted {
                provider: name.clone(),
            });
        }

        Err(OrchestratorError::AllProvidersFailed { last_error })
    }

    /// One attempt per candidate, all settled, then merged. `providers`
    /// names an explicit candidate set; otherwise every registered provider
    /// is a candidate.
    pub async fn fulfill_parallel(
        &self,
        request: &ProviderRequest,
        strategy: &Strategy,
        providers: Option<&[String]>,
        options: &FulfillOptions,
    ) -> Result<MergedResult, OrchestratorError> {
        strategy.validate().map_err(OrchestratorError::InvalidStrategy)?;

        let mut candidates = match providers {
            Some(names) => names
                .iter()
                .map(|name| self.registry.require(name))
                .collect::<Result<Vec<_>, _>>()?,
            None => self.registry.snapshot(),
        };
        candidates.truncate(strategy.max_parallel_requests);
        if candidates.is_empty() {
            return Err(OrchestratorError::NoProvidersAvailable);
        }

        let names: Vec<String> = candidates.iter().map(|p| p.name().to_string()).collect();
        options.report(ProgressUpdate::ParallelDispatched {
            providers: names.clone(),
        });
        tracing::debug!(target: "lumen.orchestrator", providers = ?names, "parallel dispatch");

        // Submit in dispatch order before awaiting anything.
        let handles: Vec<Result<TaskHandle<Response>, TaskError>> = candidates
            .iter()
            .map(|p| self.submit_attempt(p, request, strategy.timeout_ms, options))
            .collect();
        let settled = join_all(handles.into_iter().map(|h| async move {
            match h {
                Ok(handle) => handle.join().await,
                Err(err) => Err(err),
            }
        }))
        .await;

        if options.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut responses = Vec::new();
        for (name, result) in names.into_iter().zip(settled) {
            match result {
                Ok(response) => {
                    succeeded.push(name);
                    responses.push(response);
                }
                Err(err) => {
                    tracing::warn!(target: "lumen.orchestrator", provider = %name, error = %err, "parallel request failed");
                    failed.push(name);
                }
            }
        }
        options.report(ProgressUpdate::ParallelSettled { succeeded, failed });

        merge_responses(responses).ok_or(OrchestratorError::AllParallelRequestsFailed)
    }

    async fn sequential_candidates(
        &self,
        strategy: &Strategy,
        preferred: Option<&str>,
    ) -> Vec<Arc<dyn Provider>> {
        let mut ordered = order_candidates(self.registry.snapshot(), strategy, preferred);

        let is_gated = |p: &Arc<dyn Provider>| {
            p.locality() == Locality::Remote && Some(p.name()) != preferred
        };
        if let Some(gate) = &self.gate {
            if ordered.iter().any(is_gated) && !gate.is_online(false).await {
                tracing::debug!(target: "lumen.orchestrator", "offline: skipping remote providers");
                ordered.retain(|p| !is_gated(p));
            }
        }
        ordered
    }

    fn submit_attempt(
        &self,
        provider: &Arc<dyn Provider>,
        request: &ProviderRequest,
        timeout_ms: u64,
        options: &FulfillOptions,
    ) -> Result<TaskHandle<Response>, TaskError> {
        let mut task_options = TaskOptions::default().with_timeout_ms(timeout_ms);
        if let Some(priority) = options.priority {
            task_options = task_options.with_priority(priority);
        }
        if let Some(signal) = &options.signal {
            task_options = task_options.with_signal(signal.clone());
        }

        let provider = Arc::clone(provider);
        let request = request.clone();
        self.scheduler.submit(
            request.kind.clone(),
            move |token| async move { provider.send_request(&request, token).await },
            task_options,
        )
    }

    async fn attempt(
        &self,
        provider: &Arc<dyn Provider>,
        request: &ProviderRequest,
        timeout_ms: u64,
        options: &FulfillOptions,
    ) -> Result<Response, TaskError> {
        self.submit_attempt(provider, request, timeout_ms, options)?
            .join()
            .await
    }
}

/// Orders registered providers for a sequential fulfilment.
///
/// A registered `preferred` provider goes first, followed by the rest in
/// registry order. Otherwise, with `prefer_local`, local providers come
/// first and remote ones follow only if `fallback_to_remote` is set.
/// Without `prefer_local` registry order is kept.
pub fn order_candidates(
    registered: Vec<Arc<dyn Provider>>,
    strategy: &Strategy,
    preferred: Option<&str>,
) -> Vec<Arc<dyn Provider>> {
    if let Some(name) = preferred {
        if let Some(pos) = registered.iter().position(|p| p.name() == name) {
            let mut ordered = registered;
            let first = ordered.remove(pos);
            ordered.insert(0, first);
            return ordered;
        }
    }

    if !strategy.prefer_local {
        return registered;
    }

    let (mut local, remote): (Vec<_>, Vec<_>) = registered
        .into_iter()
        .partition(|p| p.locality() == Locality::Local);
    if strategy.fallback_to_remote {
        local.extend(remote);
    }
    local
}

async fn backoff(delay: Duration, signal: Option<&CancellationToken>) -> Result<(), OrchestratorError> {
    match signal {
        Some(signal) => tokio::select! {
            _ = signal.cancelled() => Err(OrchestratorError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}
