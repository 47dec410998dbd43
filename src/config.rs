use crate::derived::{PanelCapacity, StatusThresholds};
use crate::error::{AppError, Result};
use crate::models::{DeviceSelector, Granularity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub device: DeviceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub status: StatusThresholds,
    #[serde(default)]
    pub panels: PanelCapacity,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token to sign in with at startup
    #[serde(default)]
    pub access_token: Option<String>,
    /// Persisted token location; `~` is expanded
    #[serde(default)]
    pub token_file: Option<String>,
}

impl AuthConfig {
    /// Treat a blank token, or one whose `$(VAR)` was never set, as absent
    fn drop_unresolved_token(&mut self, placeholder: &regex::Regex) {
        let unresolved = self
            .access_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty() || placeholder.is_match(t));

        if unresolved {
            warn!("auth.access_token is empty or references an unset variable, ignoring it");
            self.access_token = None;
        }
    }

    pub fn token_path(&self) -> Option<PathBuf> {
        self.token_file
            .as_ref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl DeviceConfig {
    /// Device id takes precedence over location when both are set
    pub fn selector(&self) -> Result<DeviceSelector> {
        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

        match (non_empty(&self.device_id), non_empty(&self.location)) {
            (Some(id), _) => Ok(DeviceSelector::DeviceId(id)),
            (None, Some(location)) => Ok(DeviceSelector::Location(location)),
            (None, None) => Err(AppError::Config(
                "Either device.device_id or device.location must be set".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_live_interval_ms")]
    pub live_interval_ms: u64,
    #[serde(default = "default_history_interval_ms")]
    pub history_interval_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub retry_network_errors: bool,
    #[serde(default = "default_gc_grace_secs")]
    pub gc_grace_secs: u64,
    #[serde(default = "default_pause_in_background")]
    pub pause_in_background: bool,
}

fn default_live_interval_ms() -> u64 {
    2_000
}
fn default_history_interval_ms() -> u64 {
    60_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_gc_grace_secs() -> u64 {
    300
}
fn default_pause_in_background() -> bool {
    true
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            live_interval_ms: default_live_interval_ms(),
            history_interval_ms: default_history_interval_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_network_errors: false,
            gc_grace_secs: default_gc_grace_secs(),
            pause_in_background: default_pause_in_background(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
}

fn default_max_points() -> usize {
    24
}
fn default_lookback_hours() -> i64 {
    24
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::default(),
            max_points: default_max_points(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding $(VAR_NAME) placeholders first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let mut config: Config = serde_yaml::from_str(&expanded)?;
        config.auth.drop_unresolved_token(&placeholder_regex()?);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(AppError::Config("api.base_url cannot be empty".to_string()));
        }

        self.device.selector()?;

        if self.status.voltage_min >= self.status.voltage_max {
            return Err(AppError::Config(format!(
                "status.voltage_min ({}) must be below status.voltage_max ({})",
                self.status.voltage_min, self.status.voltage_max
            )));
        }

        if self.panels.panel_volts <= 0.0 || self.panels.total_volts <= 0.0 {
            return Err(AppError::Config(
                "panel capacities must be positive".to_string(),
            ));
        }

        if self.history.max_points == 0 {
            return Err(AppError::Config(
                "history.max_points cannot be 0".to_string(),
            ));
        }

        if self.polling.live_interval_ms == 0 || self.polling.history_interval_ms == 0 {
            return Err(AppError::Config(
                "polling intervals cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Matches $(VAR_NAME) placeholders
fn placeholder_regex() -> Result<regex::Regex> {
    regex::Regex::new(r"\$\(([A-Z_][A-Z0-9_]*)\)").map_err(|e| AppError::Config(e.to_string()))
}

/// Expand environment variables in the format $(VAR_NAME)
fn expand_env_vars(content: &str) -> Result<String> {
    let expanded = placeholder_regex()?.replace_all(content, |caps: &regex::Captures| {
        // Leave unknown variables untouched
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    Ok(expanded.into_owned())
}
