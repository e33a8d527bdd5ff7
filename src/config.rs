//! Configuration loader and validator for bulk invite runs.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::community::CommunityRef;
use crate::filter::Caps;
use crate::pacing::DelayRange;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub gateway: Gateway,
    pub run: RunConfig,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

impl App {
    /// `data_dir` with a leading `~/` expanded.
    pub fn resolved_data_dir(&self) -> String {
        match (self.data_dir.strip_prefix("~/"), std::env::var("HOME")) {
            (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
            _ => self.data_dir.clone(),
        }
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/bulkinvite.db", self.resolved_data_dir()))
    }
}

/// Session gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gateway {
    pub base_url: String,
    pub session: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

/// Snapshot of everything a run needs, fixed when the run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    #[serde(default)]
    pub sources: Vec<CommunityRef>,
    /// Extra recipients looked up by phone number.
    #[serde(default)]
    pub phone_numbers: Vec<String>,
    pub destination: CommunityRef,
    /// 0 = unbounded.
    #[serde(default)]
    pub per_source_cap: usize,
    /// 0 = unbounded.
    #[serde(default)]
    pub scan_cap: usize,
    pub delay: DelayRange,
    /// Only invite members seen within this many days.
    #[serde(default)]
    pub recent_window_days: Option<u32>,
}

impl RunConfig {
    pub fn new(sources: Vec<CommunityRef>, destination: CommunityRef, delay: DelayRange) -> Self {
        Self {
            sources,
            phone_numbers: Vec::new(),
            destination,
            per_source_cap: 0,
            scan_cap: 0,
            delay,
            recent_window_days: None,
        }
    }

    pub fn caps(&self) -> Caps {
        Caps {
            per_source: self.per_source_cap,
            scan: self.scan_cap,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() && self.phone_numbers.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "run.sources or run.phone_numbers must be non-empty",
            ));
        }
        if self.delay.min < 1 {
            return Err(ConfigError::Invalid("run.delay.min must be >= 1"));
        }
        if self.delay.min > self.delay.max {
            return Err(ConfigError::Invalid("run.delay.min must be <= run.delay.max"));
        }
        if self.recent_window_days == Some(0) {
            return Err(ConfigError::Invalid("run.recent_window_days must be > 0"));
        }
        if self.sources.contains(&self.destination) {
            return Err(ConfigError::Invalid(
                "run.destination must not also be listed in run.sources",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(self.app.resolved_data_dir())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.gateway.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("gateway.base_url must be non-empty"));
    }
    if cfg.gateway.session.trim().is_empty() {
        return Err(ConfigError::Invalid("gateway.session must be non-empty"));
    }
    if cfg.gateway.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("gateway.request_timeout_secs must be > 0"));
    }
    cfg.run.validate()
}

/// Example configuration, also printed by `tg-bulkinvite example-config`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

gateway:
  base_url: "http://127.0.0.1:5328/"
  session: "YOUR_GATEWAY_SESSION_ID"
  request_timeout_secs: 30

run:
  sources:
    - "@source_group_a"
    - "https://t.me/source_group_b"
  phone_numbers: []
  destination: "@target_channel"
  per_source_cap: 0
  scan_cap: 3000
  delay:
    min: 60
    max: 90
  recent_window_days: 7
"#
}
