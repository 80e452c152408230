use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::retry::RetryPolicy;
use crate::transport::Credentials;

/// Cache store settings (optional `[cache]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store location; `None` = `~/.local/state/jbatch/cache.db`.
    pub path: Option<PathBuf>,
    /// TTL for cached issue reads.
    pub default_ttl_secs: u64,
    /// How long checkpoints are kept after their last update.
    pub checkpoint_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_ttl_secs: 300,
            checkpoint_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Global configuration loaded from `~/.config/jbatch/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JbatchConfig {
    /// Site root, e.g. `https://your-site.atlassian.net`.
    pub base_url: String,
    /// Account email for basic auth. Auth is skipped unless both email and token are set.
    pub email: Option<String>,
    pub api_token: Option<String>,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Maximum requests in flight per batch.
    pub concurrency: usize,
    /// Items per checkpointed chunk; 0 = pick from the input size.
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
}

impl Default for JbatchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://your-site.atlassian.net".to_string(),
            email: None,
            api_token: None,
            timeout_secs: 30,
            connect_timeout_secs: 15,
            concurrency: 5,
            chunk_size: 0,
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl JbatchConfig {
    /// Credentials for basic auth. `JBATCH_API_TOKEN` overrides the file value.
    pub fn credentials(&self) -> Option<Credentials> {
        let token = std::env::var("JBATCH_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.api_token.clone())?;
        let email = self.email.clone()?;
        Some(Credentials {
            email,
            api_token: token,
        })
    }

    /// The `[retry]` section, validated.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        self.retry
            .validate()
            .context("invalid [retry] section in config")?;
        Ok(self.retry.clone())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("jbatch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<JbatchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = JbatchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: JbatchConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
