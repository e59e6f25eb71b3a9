//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (explicit path)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! Every section and key is optional; omitted values fall back to the same
//! defaults the builder uses. The endpoint API key may live in the file or in
//! the `HUGINN_API_KEY` environment variable.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::BatchOptions;
use crate::cache::CacheConfig;
use crate::executor::{RetryMode, RetryPolicy};
use crate::options::{CallOptions, Priority};
use crate::{HuginnError, Result};

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV_VAR: &str = "HUGINN_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub call: CallSection,
    #[serde(default)]
    pub batch: BatchSection,
}

/// Where the analysis functions live.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Project URL; functions are served under `{base_url}/functions/v1/`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key (prefer the environment variable for real deployments).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Transport timeout in seconds (default: 120).
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_http_timeout() -> u64 {
    120
}

impl EndpointConfig {
    /// API key from the file, falling back to [`API_KEY_ENV_VAR`].
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
    }
}

/// Response cache limits.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Entry count that triggers the sweep (default: 1000).
    #[serde(default = "default_high_water")]
    pub high_water: usize,
    /// Target entry count after the oldest-first trim (default: 800).
    #[serde(default = "default_low_water")]
    pub low_water: usize,
    /// TTL for cached results in seconds (default: 300).
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            high_water: default_high_water(),
            low_water: default_low_water(),
            default_ttl_secs: default_ttl(),
        }
    }
}

fn default_high_water() -> usize {
    1_000
}

fn default_low_water() -> usize {
    800
}

fn default_ttl() -> u64 {
    300
}

impl CacheSection {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .high_water(self.high_water)
            .low_water(self.low_water)
    }
}

/// Retry behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Retries after the first attempt (default: 3).
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Delay before the first retry in milliseconds (default: 1000).
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// `"transient_only"` (default) or `"blanket"`.
    #[serde(default)]
    pub mode: RetryMode,
    /// Longest honoured `retry-after` hint in seconds (default: 60).
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            base_delay_ms: default_base_delay(),
            mode: RetryMode::default(),
            max_retry_after_secs: default_max_retry_after(),
        }
    }
}

fn default_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_max_retry_after() -> u64 {
    60
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .base_delay(Duration::from_millis(self.base_delay_ms))
            .mode(self.mode)
            .max_retry_after(Duration::from_secs(self.max_retry_after_secs))
    }
}

/// Per-call defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct CallSection {
    /// Whether calls use the cache (default: true).
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    /// Per-attempt timeout in seconds (default: 30).
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,
    /// Queue priority: "high", "normal" (default) or "low".
    #[serde(default)]
    pub priority: Priority,
}

impl Default for CallSection {
    fn default() -> Self {
        Self {
            use_cache: default_use_cache(),
            timeout_secs: default_call_timeout(),
            priority: Priority::default(),
        }
    }
}

fn default_use_cache() -> bool {
    true
}

fn default_call_timeout() -> u64 {
    30
}

/// Batch runner defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    /// Items per chunk (default: 5).
    #[serde(default = "default_batch_size")]
    pub size: usize,
    /// Pause between chunks in milliseconds (default: 100).
    #[serde(default = "default_batch_delay")]
    pub delay_ms: u64,
    /// Bound on a whole chunk in seconds (default: none).
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            delay_ms: default_batch_delay(),
            step_timeout_secs: None,
        }
    }
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay() -> u64 {
    100
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            HuginnError::Configuration(msg) => {
                HuginnError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.cache.low_water > self.cache.high_water {
            return Err(HuginnError::Configuration(format!(
                "cache.low_water ({}) must not exceed cache.high_water ({})",
                self.cache.low_water, self.cache.high_water
            )));
        }
        if self.batch.size == 0 {
            return Err(HuginnError::Configuration(
                "batch.size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Default per-call options derived from `[call]`, `[cache]` and `[retry]`.
    pub fn call_options(&self) -> CallOptions {
        CallOptions::default()
            .use_cache(self.call.use_cache)
            .ttl(Duration::from_secs(self.cache.default_ttl_secs))
            .priority(self.call.priority)
            .retries(self.retry.retries)
            .timeout(Duration::from_secs(self.call.timeout_secs))
    }

    /// Default batch options derived from `[batch]` and [`call_options`](Self::call_options).
    pub fn batch_options(&self) -> BatchOptions {
        let mut options = BatchOptions::new()
            .batch_size(self.batch.size)
            .delay(Duration::from_millis(self.batch.delay_ms))
            .call_options(self.call_options());
        if let Some(secs) = self.batch.step_timeout_secs {
            options = options.step_timeout(Duration::from_secs(secs));
        }
        options
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HuginnError::Configuration(
            "No config file found. Create ~/.huginn/config.toml or /etc/huginn/config.toml"
                .to_string(),
        ))
    }
}
