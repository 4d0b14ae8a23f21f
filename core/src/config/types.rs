use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub strategy: Strategy,

    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "lumen_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Scheduler-wide limits and defaults applied when `submit` omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_task_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default)]
    pub default_priority: i32,

    /// Capacity of the task event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    256
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_timeout_ms: default_task_timeout_ms(),
            default_priority: 0,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Provider ordering, retry, timeout and parallelism settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(default = "default_true")]
    pub prefer_local: bool,

    #[serde(default = "default_true")]
    pub fallback_to_remote: bool,

    #[serde(default)]
    pub parallel_requests: bool,

    #[serde(default = "default_max_parallel_requests")]
    pub max_parallel_requests: usize,

    #[serde(default = "default_strategy_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry; doubles for every further retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_parallel_requests() -> usize {
    3
}

fn default_strategy_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            prefer_local: true,
            fallback_to_remote: true,
            parallel_requests: false,
            max_parallel_requests: default_max_parallel_requests(),
            timeout_ms: default_strategy_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl Strategy {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_parallel_requests == 0 {
            return Err("max_parallel_requests must be at least 1".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    #[serde(default = "default_cache_window_ms")]
    pub cache_window_ms: u64,

    /// Hard abort for a single probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_probe_url() -> String {
    "https://www.google.com/generate_204".to_string()
}

fn default_cache_window_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            cache_window_ms: default_cache_window_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    Auto,
    /// Offline backend only, no fallback.
    Offline,
    /// Online providers only, no offline fallback.
    Online,
}

impl std::str::FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "offline" | "forced-offline" => Ok(Self::Offline),
            "online" | "forced-online" => Ok(Self::Online),
            other => Err(format!("unknown routing mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_mode")]
    pub mode: RoutingMode,

    #[serde(default = "default_true")]
    pub prefer_offline: bool,

    /// Upper bound for a single provider's `is_available` check.
    #[serde(default = "default_availability_timeout_ms")]
    pub availability_timeout_ms: u64,

    /// Per-attempt timeout for a routed backend call.
    #[serde(default = "default_strategy_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Name of the registered provider acting as the offline backend.
    #[serde(default)]
    pub offline_provider: Option<String>,
}

fn default_routing_mode() -> RoutingMode {
    RoutingMode::Auto
}

fn default_availability_timeout_ms() -> u64 {
    3_000
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: default_routing_mode(),
            prefer_offline: true,
            availability_timeout_ms: default_availability_timeout_ms(),
            attempt_timeout_ms: default_strategy_timeout_ms(),
            offline_provider: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderConfig {
    #[serde(rename = "http")]
    Http(HttpProviderConfig),
    #[serde(rename = "command")]
    Command(CommandProviderConfig),
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Http(c) => &c.name,
            Self::Command(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    pub name: String,
    pub url: String,
    /// Never written back out; printed configs show a placeholder.
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        serialize_with = "redact"
    )]
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Transport-level timeout; the scheduler enforces the attempt timeout.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// Marks a provider served from the local machine (e.g. a local model server).
    #[serde(default)]
    pub local: bool,
    /// Optional URL checked by `is_available`; defaults to `url`.
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default)]
    pub health_method: HealthMethod,
    /// Default system instruction when the request carries none.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_http_timeout_ms() -> u64 {
    60_000
}

fn redact<S: Serializer>(_: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(REDACTED)
}

pub const REDACTED: &str = "<redacted>";

/// How `is_available` checks the health URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthMethod {
    /// `HEAD`; any HTTP answer counts as available.
    #[default]
    Head,
    /// `GET`; only a 2xx answer counts (e.g. Ollama's `/api/tags`).
    Get,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandProviderConfig {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub envs: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub local: bool,
}
