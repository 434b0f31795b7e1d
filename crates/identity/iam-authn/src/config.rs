//! Application configuration.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - a TOML file (`IAM_CONFIG_FILE`, default `iam.toml`), if present
//! - environment variables with the `IAM` prefix, `__` separating nested
//!   keys (e.g. `IAM__EVENT_BUS__WORKER_POOL_SIZE=4`)

use crate::authenticator::DeliveryMode;
use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use iam_event_core::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_POOL_SIZE, EventBusConfig};
use iam_identity_core::IdentityProviderConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

pub const CONFIG_FILE_ENV: &str = "IAM_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "iam.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Identity providers, in activation order
    pub identity_providers: Vec<IdentityProviderConfig>,

    pub event_bus: EventBusSettings,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusSettings {
    pub worker_pool_size: usize,
    pub queue_capacity: usize,
    /// How authentication events are published
    pub delivery: DeliveryMode,
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            delivery: DeliveryMode::default(),
        }
    }
}

impl EventBusSettings {
    pub fn bus_config(&self) -> EventBusConfig {
        EventBusConfig::builder()
            .worker_pool_size(self.worker_pool_size)
            .queue_capacity(self.queue_capacity)
            .build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// Log format (pretty, json, compact)
    pub format: String,

    pub target: bool,

    pub line_numbers: bool,

    pub thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            target: true,
            line_numbers: false,
            thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive handed to `EnvFilter`.
    pub fn log_filter(&self) -> String {
        self.level.to_lowercase()
    }

    fn is_directive(&self) -> bool {
        self.level.contains('=') || self.level.contains(',')
    }
}

impl AppConfig {
    /// Load from `IAM_CONFIG_FILE` (or `iam.toml`) and the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load from `path`, if it exists, layered under the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if path.exists() {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        } else {
            debug!("No config file found at {}, using defaults", path.display());
        }

        builder = builder.add_source(
            Environment::with_prefix("IAM")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let settings: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.event_bus.worker_pool_size == 0 {
            anyhow::bail!("Event bus worker pool size must be greater than 0");
        }

        if self.event_bus.queue_capacity == 0 {
            anyhow::bail!("Event bus queue capacity must be greater than 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !self.logging.is_directive() && !valid_levels.contains(&level_lower.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        let mut names = HashSet::new();
        for provider in &self.identity_providers {
            if provider.name.is_empty() {
                anyhow::bail!("Identity provider name cannot be empty");
            }
            if provider.provider_type.is_empty() {
                anyhow::bail!("Identity provider '{}' has no type", provider.name);
            }
            if !names.insert(provider.name.as_str()) {
                anyhow::bail!("Duplicate identity provider name '{}'", provider.name);
            }
        }

        Ok(())
    }
}
