//! Configuration loading, validation, and management for CaseClaw.
//!
//! Loads configuration from `~/.caseclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.caseclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the text-generation backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Backend flavour: "ollama", "openrouter", "openai" or "custom"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Override the provider's base URL (required for "custom")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per backend response (unset = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "gpt-oss:20b".into()
}
fn default_temperature() -> f32 {
    0.7
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("session", &self.session)
            .field("store", &self.store)
            .field("tools", &self.tools)
            .finish()
    }
}

/// Reasoning loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Backend requests per turn before the answer is truncated
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Protocol reminder is injected on every iteration after this one
    #[serde(default = "default_reinforce_after")]
    pub reinforce_after: u32,

    /// Deadline for one whole streamed response
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,

    /// Operator rules appended to the system prompt
    #[serde(default)]
    pub rules: Vec<String>,
}

fn default_max_iterations() -> u32 {
    50
}
fn default_reinforce_after() -> u32 {
    3
}
/// Upper bound for `agent.stream_timeout_secs` (one day).
pub const MAX_STREAM_TIMEOUT_SECS: u64 = 86_400;

fn default_stream_timeout() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            reinforce_after: default_reinforce_after(),
            stream_timeout_secs: default_stream_timeout(),
            rules: vec![],
        }
    }
}

/// Session memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Prior turns replayed into each request
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Idle sessions are dropped after this long; 0 keeps them forever
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Upper bound for `session.max_records`.
pub const MAX_SESSION_RECORDS: usize = 100;

fn default_max_records() -> usize {
    3
}
fn default_idle_timeout() -> u64 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database holding ingested reports
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    AppConfig::config_dir()
        .join("leapp_data.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Upper bound for `limit` on row-returning tools
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Upper bound for `n_results` on semantic search
    #[serde(default = "default_max_semantic_results")]
    pub max_semantic_results: u32,

    /// Embedding model; semantic search is disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

fn default_max_page_size() -> u32 {
    200
}
fn default_max_semantic_results() -> u32 {
    50
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            max_semantic_results: default_max_semantic_results(),
            embedding_model: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.caseclaw/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `CASECLAW_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
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

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("CASECLAW_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("CASECLAW_PROVIDER") {
            self.provider = provider;
        }

        if let Ok(model) = std::env::var("CASECLAW_MODEL") {
            self.model = model;
        }

        if let Ok(url) = std::env::var("CASECLAW_BASE_URL") {
            self.base_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".caseclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(
            self.provider.as_str(),
            "ollama" | "openrouter" | "openai" | "custom"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "unknown provider '{}' (expected ollama, openrouter, openai or custom)",
                self.provider
            )));
        }

        if self.provider == "custom" && self.base_url.is_none() {
            return Err(ConfigError::ValidationError(
                "provider 'custom' requires base_url".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if !(1..=MAX_STREAM_TIMEOUT_SECS).contains(&self.agent.stream_timeout_secs) {
            return Err(ConfigError::ValidationError(format!(
                "agent.stream_timeout_secs must be between 1 and {MAX_STREAM_TIMEOUT_SECS}"
            )));
        }

        if !(1..=MAX_SESSION_RECORDS).contains(&self.session.max_records) {
            return Err(ConfigError::ValidationError(format!(
                "session.max_records must be between 1 and {MAX_SESSION_RECORDS}"
            )));
        }

        if self.tools.max_page_size == 0 || self.tools.max_semantic_results == 0 {
            return Err(ConfigError::ValidationError(
                "tools.max_page_size and tools.max_semantic_results must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: None,
            agent: AgentConfig::default(),
            session: SessionConfig::default(),
            store: StoreConfig::default(),
            tools: ToolsConfig::default(),
        }
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
}

impl From<ConfigError> for caseclaw_core::Error {
    fn from(err: ConfigError) -> Self {
        caseclaw_core::Error::Config {
            message: err.to_string(),
        }
    }
}
