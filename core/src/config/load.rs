use std::path::{Path, PathBuf};

use super::types::{AppConfig, RoutingMode};

/// Get the default lumen data directory: ~/.lumen
pub fn get_lumen_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".lumen"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.lumen/config.toml (highest)
    let lumen_config = get_lumen_data_dir()?.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if lumen_config.exists() {
        load_from_path(&lumen_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    // Environment variable overrides (Priority 0: highest)
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    Ok(cfg)
}

pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("LUMEN_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = get("LUMEN_MAX_CONCURRENT") {
        cfg.scheduler.max_concurrent = v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("LUMEN_MAX_CONCURRENT is not a number: {v}"))?;
    }
    if let Some(v) = get("LUMEN_PROBE_URL") {
        cfg.connectivity.probe_url = v;
    }
    if let Some(v) = get("LUMEN_ROUTING_MODE") {
        cfg.routing.mode = v.parse::<RoutingMode>().map_err(anyhow::Error::msg)?;
    }

    Ok(())
}
