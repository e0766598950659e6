use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_API_KEY: &str = "TOPICLENS_API_KEY";
pub const ENV_ENDPOINT: &str = "TOPICLENS_ENDPOINT";
pub const ENV_MODEL: &str = "TOPICLENS_MODEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            model: "deepseek-ai/DeepSeek-V2.5".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_ms: 30_000,
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Overlays non-empty values from `lookup` (normally the process
    /// environment) onto the loaded file values.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("Completion endpoint is required"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            return Err(anyhow!("max_tokens must be positive"));
        }
        if self.timeout_ms == 0 {
            return Err(anyhow!("timeout_ms must be positive"));
        }
        if self.api_key.trim().is_empty() {
            warn!(endpoint = %self.endpoint, "API key is empty");
        }
        Ok(())
    }
}

pub fn app_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home_dir.join(".topiclens"))
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(app_dir()?.join("logs"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("config.json"))
}

/// Reads `config.json` (defaults when absent) and applies environment
/// overrides.
pub fn load() -> Result<Config> {
    load_from(&config_path()?, |key| std::env::var(key).ok())
}

pub fn load_from<F>(path: &Path, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = if path.exists() {
        let data = fs::read_to_string(path).context("read config.json")?;
        serde_json::from_str(&data).context("parse config.json")?
    } else {
        debug!(path = %path.display(), "No config file, using defaults");
        Config::default()
    };
    config.apply_overrides(lookup);
    Ok(config)
}

pub fn save(config: &Config) -> Result<()> {
    save_to(&config_path()?, config)
}

pub fn save_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create config directory")?;
    }
    let data = serde_json::to_string_pretty(config).context("serialize config")?;
    fs::write(path, data).context("write config.json")?;
    debug!(path = %path.display(), "Config saved");
    Ok(())
}
