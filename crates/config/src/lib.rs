//! Configuration loading, validation, and management for kgagent.
//!
//! Loads configuration from `~/.kgagent/config.toml` with environment
//! variable overrides. Validates all settings at startup. One `AppConfig`
//! is passed explicitly to each agent instance; nothing here is global.

use kgagent_core::persona::PersonaPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.kgagent/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent identity and storage location
    #[serde(default)]
    pub agent: AgentSection,

    /// Completion backend
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Fallback search backend
    #[serde(default)]
    pub search: SearchConfig,

    /// Knowledge graph backend
    #[serde(default)]
    pub graph: GraphConfig,

    /// Context window budgeting
    #[serde(default)]
    pub context: ContextConfig,

    /// Retrieval and entity extraction
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Durable store behaviour
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Agent ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Agent name; also keys the persisted stores
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Root directory for persisted stores (relative to the config dir when not absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_persona: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_persona: Option<PathBuf>,
}

fn default_agent_name() -> String {
    "kgagent".into()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            data_dir: None,
            system_persona: None,
            user_persona: None,
        }
    }
}

// ── Backends ──────────────────────────────────────────────────────────────

/// Timeouts and retries passed through to an HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt, transient failures only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    500
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_completion_url")]
    pub api_url: String,

    #[serde(default = "default_completion_model")]
    pub model: String,

    #[serde(default = "default_completion_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_completion_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_completion_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_completion_temperature() -> f32 {
    0.7
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_completion_url(),
            model: default_completion_model(),
            temperature: default_completion_temperature(),
            max_tokens: None,
            transport: TransportConfig::default(),
        }
    }
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("transport", &self.transport)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub api_url: String,

    #[serde(default = "default_search_model")]
    pub model: String,

    #[serde(default = "default_search_temperature")]
    pub temperature: f32,

    /// System message sent ahead of every fallback query
    #[serde(default = "default_search_prompt")]
    pub system_prompt: String,

    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_search_url() -> String {
    "https://api.perplexity.ai".into()
}
fn default_search_model() -> String {
    "mistral-7b-instruct".into()
}
fn default_search_temperature() -> f32 {
    0.5
}
fn default_search_prompt() -> String {
    "Be precise and concise.".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_search_url(),
            model: default_search_model(),
            temperature: default_search_temperature(),
            system_prompt: default_search_prompt(),
            transport: TransportConfig::default(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("system_prompt", &self.system_prompt)
            .field("transport", &self.transport)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Base URL of the graph service; unset means an in-process graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            transport: TransportConfig::default(),
        }
    }
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("transport", &self.transport)
            .finish()
    }
}

// ── Context & retrieval ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Backend context length in tokens
    #[serde(default = "default_context_length")]
    pub context_length: usize,

    /// Fraction of the context length above which eviction is scheduled
    #[serde(default = "default_eviction_rate")]
    pub eviction_rate: f64,

    /// Most recent history items never evicted
    #[serde(default = "default_noneviction_length")]
    pub noneviction_length: usize,

    #[serde(default = "default_summary_word_limit")]
    pub summary_word_limit: usize,
}

fn default_context_length() -> usize {
    4096
}
fn default_eviction_rate() -> f64 {
    0.7
}
fn default_noneviction_length() -> usize {
    5
}
fn default_summary_word_limit() -> usize {
    50
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_length: default_context_length(),
            eviction_rate: default_eviction_rate(),
            noneviction_length: default_noneviction_length(),
            summary_word_limit: default_summary_word_limit(),
        }
    }
}

impl ContextConfig {
    /// Token count above which the window must be summarized.
    pub fn eviction_threshold(&self) -> usize {
        (self.context_length as f64 * self.eviction_rate) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Soft bound on entities extracted from one graph hit
    #[serde(default = "default_max_entities")]
    pub max_entities: usize,

    /// Values that are never treated as entities
    #[serde(default = "default_entity_exceptions")]
    pub entity_exceptions: Vec<String>,

    /// File the final answer is written to before graph ingestion;
    /// defaults to `external_response.txt` in the agent's data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_path: Option<PathBuf>,

    #[serde(default = "default_max_triplets")]
    pub max_triplets_per_chunk: usize,
}

fn default_max_entities() -> usize {
    5
}
fn default_entity_exceptions() -> Vec<String> {
    vec!["Unknown relation".into()]
}
fn default_max_triplets() -> usize {
    8
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_entities: default_max_entities(),
            entity_exceptions: default_entity_exceptions(),
            scratch_path: None,
            max_triplets_per_chunk: default_max_triplets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Persist all stores after every successful turn
    #[serde(default = "default_true")]
    pub auto_save: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { auto_save: true }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.kgagent/config.toml).
    ///
    /// Also checks environment variables:
    /// - `KGAGENT_API_KEY` then `OPENAI_API_KEY` for the completion backend
    /// - `PERPLEXITY_API_KEY` for the search backend
    /// - `KGAGENT_GRAPH_URL`, `KGAGENT_MODEL`, `KGAGENT_AGENT_NAME`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides. Explicit config values for API keys win.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.completion.api_key.is_none() {
            self.completion.api_key = var("KGAGENT_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if self.search.api_key.is_none() {
            self.search.api_key = var("PERPLEXITY_API_KEY");
        }
        if let Some(url) = var("KGAGENT_GRAPH_URL") {
            self.graph.url = Some(url);
        }
        if let Some(model) = var("KGAGENT_MODEL") {
            self.completion.model = model;
        }
        if let Some(name) = var("KGAGENT_AGENT_NAME") {
            self.agent.name = name;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".kgagent")
    }

    /// Directory holding this agent's persisted stores.
    pub fn agent_data_dir(&self) -> PathBuf {
        let root = match &self.agent.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => Self::config_dir().join(dir),
            None => Self::config_dir().join("data"),
        };
        root.join(&self.agent.name)
    }

    /// Write-back scratch file. Each agent gets its own unless one is set.
    pub fn scratch_path(&self) -> PathBuf {
        self.retrieval
            .scratch_path
            .clone()
            .unwrap_or_else(|| self.agent_data_dir().join("external_response.txt"))
    }

    pub fn persona_paths(&self) -> PersonaPaths {
        PersonaPaths {
            system_persona: self.agent.system_persona.clone(),
            user_persona: self.agent.user_persona.clone(),
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.name.trim().is_empty()
            || self.agent.name.contains(['/', '\\'])
        {
            return Err(ConfigError::ValidationError(
                "agent.name must be a non-empty file name".into(),
            ));
        }

        for (field, t) in [
            ("completion.temperature", self.completion.temperature),
            ("search.temperature", self.search.temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "{field} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.context.context_length == 0 {
            return Err(ConfigError::ValidationError(
                "context.context_length must be > 0".into(),
            ));
        }

        if !(self.context.eviction_rate > 0.0 && self.context.eviction_rate <= 1.0) {
            return Err(ConfigError::ValidationError(
                "context.eviction_rate must be in (0.0, 1.0]".into(),
            ));
        }

        if self.context.summary_word_limit == 0 {
            return Err(ConfigError::ValidationError(
                "context.summary_word_limit must be > 0".into(),
            ));
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
}
