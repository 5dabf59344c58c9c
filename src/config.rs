//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (e.g. `--config <path>`), which must exist
//! 2. `~/.tolk/config.toml` (user)
//! 3. `/etc/tolk/config.toml` (system)
//!
//! When no file is found the built-in defaults apply. Every field has a
//! default, so a file only needs the values it changes:
//!
//! ```toml
//! [throttle]
//! request_limit = 30
//! window_ms = 60000
//!
//! [routing]
//! order = ["opus-mt", "deepl"]
//!
//! [routing.quotas.deepl]
//! limit = 500000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::BatchConfig;
use crate::cache::CacheConfig;
use crate::providers::{RetryConfig, RoutingConfig};
use crate::throttle::ThrottleConfig;
use crate::{Result, TolkError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub throttle: ThrottleSettings,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

/// `[throttle]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleSettings {
    /// Operations per window (default: 60).
    #[serde(default = "default_request_limit")]
    pub request_limit: u64,
    /// Estimated tokens per window (default: 100000).
    #[serde(default = "default_token_limit")]
    pub token_limit: u64,
    /// Window length in milliseconds (default: 60000).
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            request_limit: default_request_limit(),
            token_limit: default_token_limit(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_request_limit() -> u64 {
    60
}

fn default_token_limit() -> u64 {
    100_000
}

fn default_window_ms() -> u64 {
    60_000
}

impl From<&ThrottleSettings> for ThrottleConfig {
    fn from(settings: &ThrottleSettings) -> Self {
        ThrottleConfig::new()
            .request_limit(settings.request_limit)
            .token_limit(settings.token_limit)
            .window(Duration::from_millis(settings.window_ms))
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts per provider, initial call included (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig::new()
            .max_attempts(settings.max_attempts)
            .initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .max_delay(Duration::from_millis(settings.max_delay_ms))
            .jitter(settings.jitter)
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Attach the in-memory cache (default: true).
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_ttl_secs() -> u64 {
    3600
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        CacheConfig::new()
            .max_entries(settings.max_entries)
            .ttl(Duration::from_secs(settings.ttl_secs))
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.tolk/config.toml`
    /// 3. `/etc/tolk/config.toml`
    ///
    /// Falls back to defaults when none of these exist.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            TolkError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            TolkError::Configuration(msg) => {
                TolkError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TolkError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        ThrottleConfig::from(&self.throttle).validate()?;
        if self.retry.max_attempts == 0 {
            return Err(TolkError::Configuration(
                "retry max_attempts must be at least 1".into(),
            ));
        }
        if self.batch.max_tokens == 0 || self.batch.max_items == 0 {
            return Err(TolkError::Configuration(
                "batch max_tokens and max_items must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(TolkError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tolk").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/tolk/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}
