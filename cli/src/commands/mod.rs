pub mod cli;

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use lumen_core::config::AppConfig;
use lumen_core::provider::{FulfillOptions, ProgressUpdate, ProviderRequest};
use lumen_core::routing::{decode_image_payload, RecognizeOptions, RouteOptions, RouteState};
use lumen_plugins::services::Services;

use crate::error::CliError;
use cli::{AskArgs, OcrArgs, ProbeArgs, ProvidersArgs};

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let s = serde_json::to_string_pretty(value).map_err(|e| CliError::Command(e.to_string()))?;
    println!("{s}");
    Ok(())
}

fn read_prompt(args: &AskArgs) -> Result<String, CliError> {
    if let Some(p) = &args.prompt {
        return Ok(p.clone());
    }
    if let Some(path) = &args.prompt_file {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        return Err(CliError::Command(
            "empty prompt: pass --prompt, --prompt-file or pipe stdin".to_string(),
        ));
    }
    Ok(buf)
}

fn log_progress(update: &ProgressUpdate) {
    match update {
        ProgressUpdate::AttemptFailed {
            provider,
            attempt,
            error,
            retryable,
        } => tracing::info!(target: "lumen.cli", %provider, attempt, retryable, %error, "attempt failed"),
        ProgressUpdate::BackingOff {
            provider, delay_ms, ..
        } => tracing::info!(target: "lumen.cli", %provider, delay_ms, "backing off"),
        other => tracing::debug!(target: "lumen.cli", update = ?other),
    }
}

fn log_route_state(state: &RouteState) {
    tracing::debug!(target: "lumen.cli", state = ?state);
}

pub async fn handle_ask(
    args: AskArgs,
    json: bool,
    cfg: &AppConfig,
    services: &Services,
    signal: CancellationToken,
) -> Result<(), CliError> {
    let mut request = ProviderRequest::ai(read_prompt(&args)?);
    request.model = args.model.clone();
    request.system = args.system.clone();

    if args.hybrid {
        let mut route = RouteOptions::default()
            .with_signal(signal)
            .with_observer(Arc::new(log_route_state));
        if let Some(priority) = args.priority {
            route = route.with_priority(priority);
        }
        let response = services.router.route(&request, &route).await?;
        return if json {
            print_json(&response)
        } else {
            println!("{}", response.content);
            Ok(())
        };
    }

    let mut strategy = cfg.strategy.clone();
    if let Some(n) = args.retry_attempts {
        strategy.retry_attempts = n;
    }
    if let Some(ms) = args.timeout_ms {
        strategy.timeout_ms = ms;
    }
    strategy.parallel_requests |= args.parallel;

    let mut options = FulfillOptions::default()
        .with_signal(signal)
        .with_progress(Arc::new(log_progress));
    if let Some(p) = &args.provider {
        options = options.with_preferred_provider(p.clone());
    }
    if let Some(priority) = args.priority {
        options = options.with_priority(priority);
    }

    if strategy.parallel_requests {
        let explicit = (!args.with.is_empty()).then_some(args.with.as_slice());
        let merged = services
            .orchestrator
            .fulfill_parallel(&request, &strategy, explicit, &options)
            .await?;
        if json {
            return print_json(&merged);
        }
        println!("{}", merged.combined);
        tracing::info!(target: "lumen.cli", confidence = merged.confidence, sources = merged.sources.len(), "merged");
        return Ok(());
    }

    let response = services
        .orchestrator
        .fulfill_sequential(&request, &strategy, &options)
        .await?;
    if json {
        return print_json(&response);
    }
    println!("{}", response.content);
    Ok(())
}

pub async fn handle_ocr(
    args: OcrArgs,
    json: bool,
    services: &Services,
    signal: CancellationToken,
) -> Result<(), CliError> {
    let image = if args.base64 {
        decode_image_payload(&tokio::fs::read_to_string(&args.image).await?)?
    } else {
        Bytes::from(tokio::fs::read(&args.image).await?)
    };
    let options = RecognizeOptions {
        language: args.language,
    };
    let route = RouteOptions::superseding()
        .with_signal(signal)
        .with_observer(Arc::new(log_route_state));

    let recognition = services.router.recognize(image, &options, &route).await?;
    if json {
        return print_json(&recognition);
    }
    println!("{}", recognition.text);
    Ok(())
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    url: &'a str,
    online: bool,
}

pub async fn handle_probe(
    args: ProbeArgs,
    json: bool,
    cfg: &AppConfig,
    services: &Services,
) -> Result<(), CliError> {
    let online = services.gate.is_online(args.force).await;
    if json {
        return print_json(&ProbeReport {
            url: &cfg.connectivity.probe_url,
            online,
        });
    }
    println!("{}", if online { "online" } else { "offline" });
    Ok(())
}

#[derive(Serialize)]
struct ProviderRow {
    name: String,
    locality: lumen_core::provider::Locality,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<bool>,
}

pub async fn handle_providers(
    args: ProvidersArgs,
    json: bool,
    cfg: &AppConfig,
    services: &Services,
) -> Result<(), CliError> {
    let timeout = std::time::Duration::from_millis(cfg.routing.availability_timeout_ms);
    let mut rows = Vec::new();
    for p in services.registry.snapshot() {
        let available = if args.check {
            Some(
                tokio::time::timeout(timeout, p.is_available())
                    .await
                    .unwrap_or(false),
            )
        } else {
            None
        };
        rows.push(ProviderRow {
            name: p.name().to_string(),
            locality: p.locality(),
            available,
        });
    }

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("no providers configured");
    }
    for row in rows {
        let locality = serde_json::to_value(row.locality)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        match row.available {
            Some(a) => println!(
                "{}\t{}\t{}",
                row.name,
                locality,
                if a { "available" } else { "unavailable" }
            ),
            None => println!("{}\t{}", row.name, locality),
        }
    }
    Ok(())
}

pub fn handle_config(json: bool, cfg: &AppConfig) -> Result<(), CliError> {
    if json {
        return print_json(cfg);
    }
    let s = toml::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))?;
    print!("{s}");
    Ok(())
}
