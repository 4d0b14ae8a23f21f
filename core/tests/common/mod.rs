#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lumen_core::config::SchedulerConfig;
use lumen_core::error::ProbeError;
use lumen_core::connectivity::ReachabilityProbe;
use lumen_core::provider::{Locality, Provider, ProviderRequest, Response, Source};
use lumen_core::scheduler::Scheduler;
use tokio_util::sync::CancellationToken;

/// What a [`ScriptedProvider`] does on one call.
#[derive(Debug, Clone)]
pub enum Step {
    Reply {
        content: String,
        confidence: Option<f64>,
        sources: Vec<Source>,
    },
    Fail(String),
    /// Waits for cancellation, like a request that never answers.
    Hang,
    /// Answers after a delay.
    Slow(Duration, String),
}

impl Step {
    pub fn reply(content: &str) -> Self {
        Self::Reply {
            content: content.to_string(),
            confidence: None,
            sources: Vec::new(),
        }
    }

    pub fn reply_with(content: &str, confidence: f64, sources: Vec<Source>) -> Self {
        Self::Reply {
            content: content.to_string(),
            confidence: Some(confidence),
            sources,
        }
    }

    pub fn fail(msg: &str) -> Self {
        Self::Fail(msg.to_string())
    }
}

/// Provider replaying a script of steps; the last step repeats.
pub struct ScriptedProvider {
    name: String,
    locality: Locality,
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    available: AtomicBool,
    log: Option<CallLog>,
}

pub type CallLog = Arc<Mutex<Vec<String>>>;

impl ScriptedProvider {
    pub fn new(name: &str, locality: Locality, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            locality,
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            log: None,
        }
    }

    pub fn local(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self::new(name, Locality::Local, steps))
    }

    pub fn remote(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self::new(name, Locality::Remote, steps))
    }

    pub fn logged(mut self, log: &CallLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap_or(Step::fail("script is empty"))
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn locality(&self) -> Locality {
        self.locality
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn send_request(
        &self,
        _request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name.clone());
        }
        match self.next_step() {
            Step::Reply {
                content,
                confidence,
                sources,
            } => {
                let mut response = Response::new(&self.name, content).with_sources(sources);
                response.confidence = confidence;
                Ok(response)
            }
            Step::Fail(msg) => anyhow::bail!(msg),
            Step::Hang => {
                cancel.cancelled().await;
                anyhow::bail!("aborted")
            }
            Step::Slow(delay, content) => {
                tokio::select! {
                    _ = cancel.cancelled() => anyhow::bail!("aborted"),
                    _ = tokio::time::sleep(delay) => Ok(Response::new(&self.name, content)),
                }
            }
        }
    }
}

/// Probe with a fixed answer that counts its invocations.
pub struct StaticProbe {
    online: AtomicBool,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Request("dns error: no route".to_string()))
        }
    }
}

/// Routes `tracing` output through the test harness; set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn scheduler(max_concurrent: usize) -> Scheduler {
    Scheduler::new(SchedulerConfig {
        max_concurrent,
        default_timeout_ms: 10_000,
        default_priority: 0,
        event_capacity: 256,
    })
}
