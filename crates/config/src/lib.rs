//! Configuration loading, validation, and management for Inkweave.
//!
//! Loads configuration from `~/.inkweave/config.toml` with environment
//! variable overrides. Validates all settings at startup.

pub mod logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.inkweave/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Retry loop and quality gate settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Memory coordinator cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// External service endpoints
    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token-proxy budget for one assembled context
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// How many preceding units to fetch into the continuity window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// How many similar past units to fetch as style references
    #[serde(default = "default_similar_limit")]
    pub similar_limit: usize,

    /// Minimum cosine similarity for a style reference
    #[serde(default)]
    pub similarity_threshold: f32,

    /// Notes kept per research lookup
    #[serde(default = "default_research_notes")]
    pub max_research_notes: usize,
}

fn default_token_budget() -> usize {
    8000
}
fn default_window_size() -> usize {
    10
}
fn default_similar_limit() -> usize {
    5
}
fn default_research_notes() -> usize {
    6
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            window_size: default_window_size(),
            similar_limit: default_similar_limit(),
            similarity_threshold: 0.0,
            max_research_notes: default_research_notes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Detectability scores above this are rejected (lower is better)
    #[serde(default = "default_detectability_threshold")]
    pub detectability_threshold: f64,

    /// Correction directives carried between attempts
    #[serde(default = "default_max_directives")]
    pub max_directives: usize,

    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_agents: Option<u32>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    1000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_detectability_threshold() -> f64 {
    10.0
}
fn default_max_directives() -> usize {
    inkweave_core::narrative::DEFAULT_MAX_DIRECTIVES
}
fn default_generation_timeout_ms() -> u64 {
    inkweave_core::service::DEFAULT_GENERATION_TIMEOUT_MS
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            detectability_threshold: default_detectability_threshold(),
            max_directives: default_max_directives(),
            generation_timeout_ms: default_generation_timeout_ms(),
            max_agents: None,
        }
    }
}

/// Which entry the cache drops when full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently read or written
    #[default]
    Lru,
    /// Oldest insertion, regardless of reads
    InsertionOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default)]
    pub eviction: EvictionPolicy,

    /// How often the background sweeper drops expired entries
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    300
}
fn default_max_entries() -> usize {
    1000
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            eviction: EvictionPolicy::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_url: Option<String>,

    /// Bearer token sent to both services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ServicesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesConfig")
            .field("generation_url", &self.generation_url)
            .field("research_url", &self.research_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.inkweave/config.toml),
    /// then apply environment overrides:
    /// - `INKWEAVE_GENERATION_URL`
    /// - `INKWEAVE_RESEARCH_URL`
    /// - `INKWEAVE_API_KEY`
    /// - `INKWEAVE_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup. Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("INKWEAVE_GENERATION_URL") {
            self.services.generation_url = Some(url);
        }
        if let Some(url) = get("INKWEAVE_RESEARCH_URL") {
            self.services.research_url = Some(url);
        }
        if let Some(key) = get("INKWEAVE_API_KEY") {
            self.services.api_key = Some(key);
        }
        if let Some(level) = get("INKWEAVE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".inkweave")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "context.token_budget must be > 0".into(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.context.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "context.similarity_threshold must be between -1.0 and 1.0".into(),
            ));
        }

        let orch = &self.orchestrator;
        if orch.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_attempts must be >= 1".into(),
            ));
        }
        if !orch.backoff_multiplier.is_finite() || orch.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.backoff_multiplier must be >= 1.0".into(),
            ));
        }
        if !(0.0..=100.0).contains(&orch.detectability_threshold) {
            return Err(ConfigError::ValidationError(
                "orchestrator.detectability_threshold must be between 0 and 100".into(),
            ));
        }
        if orch.max_directives == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_directives must be >= 1".into(),
            ));
        }
        if orch.generation_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.generation_timeout_ms must be > 0".into(),
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_entries must be > 0".into(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.sweep_interval_secs must be > 0".into(),
            ));
        }

        for (name, url) in [
            ("services.generation_url", &self.services.generation_url),
            ("services.research_url", &self.services.research_url),
        ] {
            if let Some(url) = url
                && !(url.starts_with("http://") || url.starts_with("https://"))
            {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to initialise logging: {0}")]
    LoggingError(String),
}

impl From<ConfigError> for inkweave_core::Error {
    fn from(err: ConfigError) -> Self {
        inkweave_core::Error::ConfigurationFailure {
            message: err.to_string(),
        }
    }
}
