use crate::conversion::format::OutputFormat;
use crate::conversion::{DispatcherSettings, StreamSettings};
use crate::resolve::ResolverTiming;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration (saved to config/settings.toml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".to_string(),
            timeout_secs: 600,
            connect_timeout_secs: 10,
            user_agent: format!("setube/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub pending_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub playlist_settle_delay_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pending_delay_ms: 300,
            settle_delay_ms: 1000,
            playlist_settle_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub grace_period_ms: u64,
    pub close_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 3000,
            close_delay_ms: 2000,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub dismiss_after_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            dismiss_after_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub default_format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: crate::util::paths::resolve_default_output_directory(),
            default_format: OutputFormat::default(),
        }
    }
}

/// A single configuration rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyBaseUrl,
    InvalidBaseUrl(String),
    /// A request timeout of zero would fail every call
    ZeroTimeout { field: &'static str },
    /// The lookup would fire before the pending indicator
    SettleNotAfterPending { pending_ms: u64, settle_ms: u64 },
    ZeroGracePeriod,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyBaseUrl => write!(f, "api.base_url must not be empty"),
            ValidationError::InvalidBaseUrl(reason) => {
                write!(f, "api.base_url is not a valid URL: {}", reason)
            }
            ValidationError::ZeroTimeout { field } => {
                write!(f, "{} must be greater than zero", field)
            }
            ValidationError::SettleNotAfterPending {
                pending_ms,
                settle_ms,
            } => write!(
                f,
                "resolver.settle_delay_ms ({}) must exceed resolver.pending_delay_ms ({})",
                settle_ms, pending_ms
            ),
            ValidationError::ZeroGracePeriod => {
                write!(f, "stream.grace_period_ms must be greater than zero")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl Config {
    /// Load settings.toml from the config directory; a missing file yields defaults
    pub fn load() -> anyhow::Result<Self> {
        let config_path = crate::util::paths::get_app_config_path()?;
        let config = Self::load_from(&config_path)?;

        if let Err(errors) = config.validate() {
            return Err(anyhow::anyhow!(
                "Invalid configuration: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        Ok(config)
    }

    /// Validate and atomically write settings.toml into the config directory
    pub fn save(&self) -> anyhow::Result<()> {
        if let Err(errors) = self.validate() {
            return Err(anyhow::anyhow!(
                "Cannot save invalid config: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        let config_path = crate::util::paths::get_app_config_path()?;
        self.save_to(&config_path)?;
        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let mut config: Self =
            toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;

        config.output.directory =
            crate::util::paths::resolve_relative_to_config(&config.output.directory);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;

        // Atomic write using temp file + rename
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &content).context("Failed to write temp config file")?;
        std::fs::rename(&temp_path, path).context("Failed to rename temp config file")?;
        Ok(())
    }

    /// Check every rule and report all violations at once
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            errors.push(ValidationError::EmptyBaseUrl);
        } else if let Err(e) = url::Url::parse(base_url) {
            errors.push(ValidationError::InvalidBaseUrl(e.to_string()));
        }

        if self.api.timeout_secs == 0 {
            errors.push(ValidationError::ZeroTimeout { field: "api.timeout_secs" });
        }
        if self.api.connect_timeout_secs == 0 {
            errors.push(ValidationError::ZeroTimeout {
                field: "api.connect_timeout_secs",
            });
        }

        if self.resolver.settle_delay_ms <= self.resolver.pending_delay_ms {
            errors.push(ValidationError::SettleNotAfterPending {
                pending_ms: self.resolver.pending_delay_ms,
                settle_ms: self.resolver.settle_delay_ms,
            });
        }

        if self.stream.grace_period_ms == 0 {
            errors.push(ValidationError::ZeroGracePeriod);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn resolver_timing(&self) -> ResolverTiming {
        ResolverTiming {
            pending_delay: Duration::from_millis(self.resolver.pending_delay_ms),
            settle_delay: Duration::from_millis(self.resolver.settle_delay_ms),
        }
    }

    pub fn playlist_settle_delay(&self) -> Duration {
        Duration::from_millis(self.resolver.playlist_settle_delay_ms)
    }

    pub fn dismiss_after(&self) -> Duration {
        Duration::from_millis(self.notifications.dismiss_after_ms)
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            output_dir: self.output.directory.clone(),
            grace_period: Duration::from_millis(self.stream.grace_period_ms),
            close_delay: Duration::from_millis(self.stream.close_delay_ms),
            stream: StreamSettings {
                reconnect_delay: Duration::from_millis(self.stream.reconnect_delay_ms),
                max_reconnect_attempts: self.stream.max_reconnect_attempts,
            },
        }
    }
}
