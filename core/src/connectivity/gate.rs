use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::ConnectivityConfig;
use crate::error::ProbeError;

use super::probe::ReachabilityProbe;

type ProbeFuture = Shared<BoxFuture<'static, bool>>;

/// Cached answer to "are online providers worth trying".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityVerdict {
    pub is_online: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Default)]
struct GateState {
    verdict: Option<(ConnectivityVerdict, Instant)>,
    in_flight: Option<(u64, ProbeFuture)>,
    generation: u64,
}

/// Probes reachability on demand and caches the verdict for
/// `cache_window_ms`. Concurrent callers share one in-flight probe.
pub struct ConnectivityGate {
    probe: Arc<dyn ReachabilityProbe>,
    cache_window: Duration,
    probe_timeout: Duration,
    state: Arc<Mutex<GateState>>,
}

impl ConnectivityGate {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, config: &ConnectivityConfig) -> Self {
        Self {
            probe,
            cache_window: Duration::from_millis(config.cache_window_ms),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            state: Arc::new(Mutex::new(GateState::default())),
        }
    }

    /// Cached verdict when fresh and `force_refresh` is false; otherwise
    /// probes (or joins the probe already in flight). Never fails: probe
    /// errors and timeouts mean offline.
    pub async fn is_online(&self, force_refresh: bool) -> bool {
        let probe = {
            let mut state = lock(&self.state);
            if !force_refresh {
                if let Some((verdict, at)) = state.verdict {
                    if at.elapsed() < self.cache_window {
                        return verdict.is_online;
                    }
                }
            }
            match &state.in_flight {
                Some((_, probe)) => probe.clone(),
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let probe = self.start_probe(generation);
                    state.in_flight = Some((generation, probe.clone()));
                    probe
                }
            }
        };

        probe.await
    }

    /// Drops the cached verdict; the next `is_online` re-probes.
    pub fn invalidate(&self) {
        let mut state = lock(&self.state);
        state.verdict = None;
        state.in_flight = None;
        tracing::debug!(target: "lumen.connectivity", "connectivity cache invalidated");
    }

    /// Last verdict regardless of age.
    pub fn cached(&self) -> Option<ConnectivityVerdict> {
        lock(&self.state).verdict.map(|(verdict, _)| verdict)
    }

    /// The probe runs on its own task and records its verdict there, so the
    /// cache is updated even when every waiter has gone away.
    fn start_probe(&self, generation: u64) -> ProbeFuture {
        let probe = Arc::clone(&self.probe);
        let state = Arc::clone(&self.state);
        let timeout = self.probe_timeout;
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, probe.probe()).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout(timeout.as_millis() as u64)),
            };
            let is_online = match result {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(
                        target: "lumen.connectivity",
                        error = %err,
                        code = err.error_code().as_u16(),
                        "probe failed, treating as offline"
                    );
                    false
                }
            };

            let mut state = lock(&state);
            // invalidate() ran meanwhile; this verdict is stale.
            if state
                .in_flight
                .as_ref()
                .is_some_and(|(g, _)| *g == generation)
            {
                state.in_flight = None;
                state.verdict = Some((
                    ConnectivityVerdict {
                        is_online,
                        checked_at: Utc::now(),
                    },
                    Instant::now(),
                ));
                tracing::debug!(target: "lumen.connectivity", is_online, "connectivity verdict cached");
            }
            is_online
        });
        task.map(|joined| joined.unwrap_or(false)).boxed().shared()
    }
}

fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
        delay: Duration,
        online: bool,
    }

    impl CountingProbe {
        fn new(online: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                online,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReachabilityProbe for CountingProbe {
        async fn probe(&self) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.online {
                Ok(())
            } else {
                Err(ProbeError::Request("connection refused".into()))
            }
        }
    }

    fn gate(probe: Arc<CountingProbe>) -> ConnectivityGate {
        ConnectivityGate::new(probe, &ConnectivityConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn caches_within_window() {
        let probe = CountingProbe::new(true, Duration::from_millis(10));
        let gate = gate(Arc::clone(&probe));
        assert!(gate.is_online(false).await);
        assert!(gate.is_online(false).await);
        assert_eq!(probe.calls(), 1);

        tokio::time::advance(Duration::from_millis(30_001)).await;
        assert!(gate.is_online(false).await);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_and_force_refresh_reprobe() {
        let probe = CountingProbe::new(true, Duration::ZERO);
        let gate = gate(Arc::clone(&probe));
        gate.is_online(false).await;
        gate.invalidate();
        assert!(gate.cached().is_none());
        gate.is_online(false).await;
        gate.is_online(true).await;
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_probe() {
        let probe = CountingProbe::new(false, Duration::from_millis(500));
        let gate = gate(Arc::clone(&probe));
        let (a, b, c) = tokio::join!(
            gate.is_online(false),
            gate.is_online(false),
            gate.is_online(true)
        );
        assert!(!a && !b && !c);
        assert_eq!(probe.calls(), 1);
        assert_eq!(gate.cached().map(|v| v.is_online), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_times_out_as_offline() {
        let probe = CountingProbe::new(true, Duration::from_secs(10));
        let gate = gate(Arc::clone(&probe));
        assert!(!gate.is_online(false).await);
    }

    #[tokio::test(start_paused = true)]
    async fn verdict_is_recorded_without_waiters() {
        let probe = CountingProbe::new(true, Duration::from_millis(100));
        let gate = gate(Arc::clone(&probe));
        tokio::select! {
            _ = gate.is_online(false) => panic!("probe finished too early"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(gate.cached().map(|v| v.is_online), Some(true));
        assert_eq!(probe.calls(), 1);

        // Past the window a new probe runs instead of reusing the old result.
        tokio::time::advance(Duration::from_millis(30_001)).await;
        assert!(gate.is_online(false).await);
        assert_eq!(probe.calls(), 2);
    }
}
