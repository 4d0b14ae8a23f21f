mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use lumen_core::config::{ConnectivityConfig, RoutingConfig, RoutingMode};
use lumen_core::connectivity::ConnectivityGate;
use lumen_core::error::{OrchestratorError, RecognitionError};
use lumen_core::provider::{Provider, ProviderRegistry, ProviderRequest};
use lumen_core::routing::{
    Backend, HybridRouter, Recognition, RecognizeOptions, Recognizer, RecognizerProvider,
    RouteOptions, RouteState,
};
use lumen_core::scheduler::Scheduler;
use pretty_assertions::assert_eq;

use common::{scheduler, ScriptedProvider, StaticProbe, Step};

struct Fixture {
    router: Arc<HybridRouter>,
    scheduler: Scheduler,
    probe: Arc<StaticProbe>,
}

fn fixture(mode: RoutingMode, prefer_offline: bool, providers: Vec<Arc<dyn Provider>>) -> Fixture {
    let registry = Arc::new(ProviderRegistry::new());
    for p in providers {
        registry.register(p);
    }
    let probe = StaticProbe::new(true);
    let gate = Arc::new(ConnectivityGate::new(probe.clone(), &ConnectivityConfig::default()));
    let scheduler = scheduler(2);
    let config = RoutingConfig {
        mode,
        prefer_offline,
        ..RoutingConfig::default()
    };
    Fixture {
        router: Arc::new(HybridRouter::new(registry, scheduler.clone(), gate, config)),
        scheduler,
        probe,
    }
}

fn observed() -> (RouteOptions, Arc<Mutex<Vec<RouteState>>>) {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    let options = RouteOptions::default().with_observer(Arc::new(move |s: &RouteState| {
        sink.lock().unwrap().push(s.clone());
    }));
    (options, states)
}

fn attempting(backend: Backend, provider: &str) -> RouteState {
    RouteState::Attempting {
        backend,
        provider: provider.to_string(),
    }
}

#[tokio::test]
async fn prefer_offline_falls_back_to_first_available_online() {
    let offline = ScriptedProvider::local("tesseract", vec![Step::fail("engine crashed")]);
    let down = Arc::new(
        ScriptedProvider::new("cloud-a", lumen_core::provider::Locality::Remote, vec![Step::reply("a")])
            .unavailable(),
    );
    let up = ScriptedProvider::remote("cloud-b", vec![Step::reply("b")]);
    let spare = ScriptedProvider::remote("cloud-c", vec![Step::reply("c")]);
    let f = fixture(
        RoutingMode::Auto,
        true,
        vec![offline.clone(), down.clone(), up.clone(), spare.clone()],
    );
    let (options, states) = observed();

    let response = f
        .router
        .route(&ProviderRequest::ai("hi"), &options)
        .await
        .unwrap();

    assert_eq!(response.content, "b");
    assert_eq!(down.calls(), 0);
    assert_eq!(spare.calls(), 0);
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            RouteState::Idle,
            attempting(Backend::Offline, "tesseract"),
            attempting(Backend::Online, "cloud-b"),
            RouteState::Succeeded {
                backend: Backend::Online,
                provider: "cloud-b".to_string()
            },
        ]
    );
    // Preferring offline never consults the gate.
    assert_eq!(f.probe.calls(), 0);
}

#[tokio::test]
async fn prefer_offline_reports_last_online_error() {
    let offline = ScriptedProvider::local("tesseract", vec![Step::fail("engine crashed")]);
    let a = ScriptedProvider::remote("cloud-a", vec![Step::fail("HTTP 500")]);
    let b = ScriptedProvider::remote("cloud-b", vec![Step::fail("HTTP 401: bad key")]);
    let f = fixture(RoutingMode::Auto, true, vec![offline, a, b]);
    let (options, states) = observed();

    let err = f
        .router
        .route(&ProviderRequest::ai("hi"), &options)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        OrchestratorError::AllProvidersFailed {
            last_error: "HTTP 401: bad key".to_string()
        }
    );
    assert_eq!(
        states.lock().unwrap().last(),
        Some(&RouteState::Failed {
            error: "HTTP 401: bad key".to_string()
        })
    );
}

#[tokio::test]
async fn online_first_when_gate_reports_online() {
    let offline = ScriptedProvider::local("local-llm", vec![Step::reply("offline answer")]);
    let online = ScriptedProvider::remote("cloud", vec![Step::fail("fetch failed")]);
    let f = fixture(RoutingMode::Auto, false, vec![offline.clone(), online.clone()]);

    let response = f
        .router
        .route(&ProviderRequest::ai("hi"), &RouteOptions::default())
        .await
        .unwrap();
    assert_eq!(response.content, "offline answer");
    assert_eq!(online.calls(), 1);
    assert_eq!(f.probe.calls(), 1);
}

#[tokio::test]
async fn offline_verdict_goes_straight_to_offline() {
    let offline = ScriptedProvider::local("local-llm", vec![Step::reply("offline answer")]);
    let online = ScriptedProvider::remote("cloud", vec![Step::reply("online answer")]);
    let f = fixture(RoutingMode::Auto, false, vec![offline, online.clone()]);
    f.probe.set_online(false);

    let response = f
        .router
        .route(&ProviderRequest::ai("hi"), &RouteOptions::default())
        .await
        .unwrap();
    assert_eq!(response.content, "offline answer");
    assert_eq!(online.calls(), 0);
}

#[tokio::test]
async fn forced_modes_never_fall_back() {
    let offline = ScriptedProvider::local("tesseract", vec![Step::fail("engine crashed")]);
    let online = ScriptedProvider::remote("cloud", vec![Step::reply("online")]);
    let f = fixture(
        RoutingMode::Offline,
        true,
        vec![offline.clone(), online.clone()],
    );
    let err = f
        .router
        .route(&ProviderRequest::ai("hi"), &RouteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.last_cause(), "engine crashed");
    assert_eq!(online.calls(), 0);

    let offline = ScriptedProvider::local("tesseract", vec![Step::reply("offline")]);
    let online = ScriptedProvider::remote("cloud", vec![Step::fail("HTTP 503")]);
    let f = fixture(RoutingMode::Online, true, vec![offline.clone(), online]);
    let err = f
        .router
        .route(&ProviderRequest::ai("hi"), &RouteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.last_cause(), "HTTP 503");
    assert_eq!(offline.calls(), 0);
}

#[tokio::test]
async fn superseding_request_cancels_stale_one() {
    let offline = ScriptedProvider::local("tesseract", vec![Step::Hang, Step::reply("fresh")]);
    let f = fixture(RoutingMode::Offline, true, vec![offline]);
    let request = ProviderRequest::ocr(Bytes::from_static(b"png"));

    let router = Arc::clone(&f.router);
    let stale_request = request.clone();
    let stale = tokio::spawn(async move {
        router
            .route(&stale_request, &RouteOptions::superseding())
            .await
    });
    while f.scheduler.status().running == 0 {
        tokio::task::yield_now().await;
    }

    let fresh = f
        .router
        .route(&request, &RouteOptions::superseding())
        .await
        .unwrap();
    assert_eq!(fresh.content, "fresh");
    assert_eq!(stale.await.unwrap(), Err(OrchestratorError::Cancelled));
}

struct Engine(Result<&'static str, &'static str>);

#[async_trait]
impl Recognizer for Engine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(
        &self,
        _image: &[u8],
        options: &RecognizeOptions,
    ) -> anyhow::Result<Recognition> {
        match self.0 {
            Ok(text) => Ok(Recognition {
                text: text.to_string(),
                confidence: 0.87,
                language: options.language.clone(),
            }),
            Err(msg) => anyhow::bail!(msg),
        }
    }
}

#[tokio::test]
async fn recognize_through_offline_engine() {
    let engine: Arc<dyn Provider> = Arc::new(RecognizerProvider::new(Arc::new(Engine(Ok("Hello")))));
    let f = fixture(RoutingMode::Auto, true, vec![engine]);
    let options = RecognizeOptions {
        language: Some("eng".to_string()),
    };

    let recognition = f
        .router
        .recognize(Bytes::from_static(b"png"), &options, &RouteOptions::superseding())
        .await
        .unwrap();
    assert_eq!(
        recognition,
        Recognition {
            text: "Hello".to_string(),
            confidence: 0.87,
            language: Some("eng".to_string()),
        }
    );
}

#[tokio::test]
async fn recognize_failure_carries_cause() {
    let engine: Arc<dyn Provider> =
        Arc::new(RecognizerProvider::new(Arc::new(Engine(Err("unsupported image format")))));
    let f = fixture(RoutingMode::Offline, true, vec![engine]);

    let err = f
        .router
        .recognize(
            Bytes::from_static(b"gif"),
            &RecognizeOptions::default(),
            &RouteOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RecognitionError::RecognitionFailed {
            cause: "unsupported image format".to_string()
        }
    );
}
