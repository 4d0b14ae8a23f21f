use clap::Parser;
use lumen_cli::commands::{self, cli};
use lumen_cli::error::CliError;
use lumen_core::config::LoggingConfig;
use lumen_plugins::services::Services;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = lumen_core::config::load_default().map_err(|e| CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    if let cli::Commands::Config = args.command {
        commands::handle_config(args.json, &cfg)?;
        return Ok(0);
    }

    let services = Services::build(&cfg).map_err(|e| CliError::Config(format!("{e:#}")))?;

    let signal = CancellationToken::new();
    let on_interrupt = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: "lumen.cli", "interrupted, cancelling in-flight requests");
            on_interrupt.cancel();
        }
    });

    match args.command {
        cli::Commands::Ask(ask) => {
            commands::handle_ask(ask, args.json, &cfg, &services, signal).await?
        }
        cli::Commands::Ocr(ocr) => commands::handle_ocr(ocr, args.json, &services, signal).await?,
        cli::Commands::Probe(probe) => {
            commands::handle_probe(probe, args.json, &cfg, &services).await?
        }
        cli::Commands::Providers(list) => {
            commands::handle_providers(list, args.json, &cfg, &services).await?
        }
        cli::Commands::Config => commands::handle_config(args.json, &cfg)?,
    }
    Ok(0)
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("lumen"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("lumen.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
