use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lumen", version, about = "Resilient OCR/AI request orchestration")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Print results as JSON instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AskArgs {
    /// Prompt text. Reads stdin when neither --prompt nor --prompt-file is given.
    #[arg(long, group = "input")]
    pub prompt: Option<String>,

    #[arg(long, group = "input")]
    pub prompt_file: Option<PathBuf>,

    #[arg(long)]
    pub model: Option<String>,

    /// System instruction sent along with the prompt.
    #[arg(long)]
    pub system: Option<String>,

    /// Provider to try first.
    #[arg(long)]
    pub provider: Option<String>,

    /// Dispatch to several providers at once and merge the answers.
    #[arg(long)]
    pub parallel: bool,

    /// Explicit provider set for --parallel. Can be specified multiple times.
    #[arg(long = "with", action = clap::ArgAction::Append, requires = "parallel")]
    pub with: Vec<String>,

    /// Route through the offline/online hybrid router instead of the
    /// fallback chain.
    #[arg(long, conflicts_with = "parallel")]
    pub hybrid: bool,

    #[arg(long)]
    pub priority: Option<i32>,

    #[arg(long)]
    pub retry_attempts: Option<u32>,

    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct OcrArgs {
    /// Image file to recognize.
    pub image: PathBuf,

    /// Language hint passed to the engine.
    #[arg(long)]
    pub language: Option<String>,

    /// The file holds base64 text (optionally a data URL) instead of raw bytes.
    #[arg(long)]
    pub base64: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ProbeArgs {
    /// Ignore the cached verdict.
    #[arg(long)]
    pub force: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ProvidersArgs {
    /// Run each provider's availability check.
    #[arg(long)]
    pub check: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fulfil a prompt through the configured providers.
    Ask(AskArgs),
    /// Recognize text in an image through the hybrid router.
    Ocr(OcrArgs),
    /// Report network reachability.
    Probe(ProbeArgs),
    /// List registered providers.
    Providers(ProvidersArgs),
    /// Print the effective configuration.
    Config,
}
