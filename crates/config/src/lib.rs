//! Configuration loading, validation, and management for ToolRelay.
//!
//! Loads configuration from `~/.toolrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use toolrelay_core::protocol::Protocol;
use toolrelay_core::provider::{ProviderTransport, ToolProviderDescriptor};
use toolrelay_core::skill::Skill;

/// The root configuration structure.
///
/// Maps directly to `~/.toolrelay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Skill ids exposed through the skill library on every run
    #[serde(default)]
    pub selected_skills: Vec<String>,

    /// Model endpoint
    #[serde(default)]
    pub model: ModelConfig,

    /// Loop limits and session caps
    #[serde(default)]
    pub agent: AgentConfig,

    /// Timeouts, retry policy and endpoint policy
    #[serde(default)]
    pub transport: TransportConfig,

    /// Tool providers, remote and builtin
    #[serde(default)]
    pub providers: Vec<ToolProviderDescriptor>,

    /// Skill library definitions
    #[serde(default)]
    pub skills: Vec<Skill>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_response_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            max_response_tokens: default_max_response_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("protocol", &self.protocol)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Turn cap for one loop invocation
    #[serde(default = "default_agent_max_steps")]
    pub agent_max_steps: usize,

    /// Consecutive turns with neither answer nor tool calls before giving up
    #[serde(default = "default_agent_no_progress_limit")]
    pub agent_no_progress_limit: u32,

    #[serde(default = "default_memory_max_steps")]
    pub memory_max_steps: usize,

    #[serde(default = "default_event_log_max")]
    pub event_log_max: usize,
}

fn default_agent_max_steps() -> usize {
    6
}
fn default_agent_no_progress_limit() -> u32 {
    2
}
fn default_memory_max_steps() -> usize {
    32
}
fn default_event_log_max() -> usize {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_max_steps: default_agent_max_steps(),
            agent_no_progress_limit: default_agent_no_progress_limit(),
            memory_max_steps: default_memory_max_steps(),
            event_log_max: default_event_log_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-call timeout for tool providers
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Per-call timeout for model endpoints
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Allow plain `http` tool endpoints on loopback hosts
    #[serde(default)]
    pub developer_mode: bool,
}

fn default_timeout_ms() -> u64 {
    15_000
}
fn default_model_timeout_ms() -> u64 {
    120_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    350
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_backoff_ms() -> u64 {
    2_500
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            model_timeout_ms: default_model_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            developer_mode: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolrelay/config.toml),
    /// then apply environment overrides:
    /// - `TOOLRELAY_API_KEY`
    /// - `TOOLRELAY_BASE_URL`
    /// - `TOOLRELAY_MODEL`
    /// - `TOOLRELAY_PROTOCOL`
    /// - `TOOLRELAY_DEVELOPER_MODE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from an environment lookup. Taking the lookup as a
    /// closure keeps tests away from the process environment.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup("TOOLRELAY_API_KEY").filter(|v| !v.is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup("TOOLRELAY_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("TOOLRELAY_MODEL") {
            self.model.model = model;
        }
        if let Some(protocol) = lookup("TOOLRELAY_PROTOCOL") {
            self.model.protocol = protocol.parse().map_err(ConfigError::ValidationError)?;
        }
        if let Some(flag) = lookup("TOOLRELAY_DEVELOPER_MODE") {
            self.transport.developer_mode = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolrelay")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.agent_max_steps == 0 || self.agent.agent_no_progress_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.agent_max_steps and agent.agent_no_progress_limit must be > 0".into(),
            ));
        }

        if self.agent.memory_max_steps == 0 || self.agent.event_log_max == 0 {
            return Err(ConfigError::ValidationError(
                "agent.memory_max_steps and agent.event_log_max must be > 0".into(),
            ));
        }

        if self.transport.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "transport.backoff_multiplier must be >= 1.0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
            if provider.transport == ProviderTransport::Http && provider.endpoint.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}' uses http transport but has no endpoint",
                    provider.id
                )));
            }
        }

        for id in &self.selected_skills {
            if !self.skills.iter().any(|s| &s.id == id) {
                return Err(ConfigError::ValidationError(format!(
                    "selected skill '{id}' is not defined"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Skills named by `ids`, in the order given. Unknown ids are skipped.
    pub fn skills_by_id(&self, ids: &[String]) -> Vec<Skill> {
        ids.iter()
            .filter_map(|id| self.skills.iter().find(|s| &s.id == id).cloned())
            .collect()
    }

    /// Generate a default config TOML string (for the `config` command).
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.agent_max_steps, 6);
        assert_eq!(config.agent.agent_no_progress_limit, 2);
        assert_eq!(config.transport.timeout_ms, 15_000);
        assert_eq!(config.transport.max_retries, 2);
        assert_eq!(config.transport.initial_backoff_ms, 350);
        assert_eq!(config.transport.max_backoff_ms, 2_500);
        assert!(!config.transport.developer_mode);
    }

    #[test]
    fn config_roundtrip_toml() {
        let mut config = AppConfig::default();
        config.providers.push(ToolProviderDescriptor::http("search", "https://tools.example.com/rpc"));
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.providers.len(), 1);
        assert_eq!(parsed.providers[0].endpoint, "https://tools.example.com/rpc");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.model.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_step_cap_rejected() {
        let mut config = AppConfig::default();
        config.agent.agent_max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_provider_ids_rejected() {
        let mut config = AppConfig::default();
        config.providers.push(ToolProviderDescriptor::http("a", "https://one"));
        config.providers.push(ToolProviderDescriptor::http("a", "https://two"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate provider id 'a'"));
    }

    #[test]
    fn http_provider_without_endpoint_rejected() {
        let mut config = AppConfig::default();
        config.providers.push(ToolProviderDescriptor::http("a", ""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn undefined_selected_skill_rejected() {
        let config = AppConfig {
            selected_skills: vec!["ghost".into()],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model.protocol, Protocol::ChatCompletions);
    }

    #[test]
    fn load_from_file_with_providers_and_skills() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
selected_skills = ["triage"]

[model]
protocol = "messages"
base_url = "https://api.anthropic.com/v1"
model = "claude-sonnet-4"

[agent]
agent_max_steps = 4

[[providers]]
id = "search"
endpoint = "https://search.example.com/mcp"
api_key = "sk-test"

[[providers]]
id = "builtin_page_context"
transport = "builtin"
toolset = "page_context"

[[skills]]
id = "triage"
name = "Bug triage"
description = "Sorts incoming bugs"
instructions = "Label by severity."
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model.protocol, Protocol::Messages);
        assert_eq!(config.agent.agent_max_steps, 4);
        assert_eq!(config.agent.agent_no_progress_limit, 2);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].transport, ProviderTransport::Builtin);
        assert_eq!(config.skills_by_id(&config.selected_skills).len(), 1);
    }

    #[test]
    fn unparseable_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[model\nprotocol = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TOOLRELAY_API_KEY", "sk-env"),
            ("TOOLRELAY_MODEL", "gpt-4.1"),
            ("TOOLRELAY_PROTOCOL", "responses"),
            ("TOOLRELAY_DEVELOPER_MODE", "1"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.model.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.model.model, "gpt-4.1");
        assert_eq!(config.model.protocol, Protocol::Responses);
        assert!(config.transport.developer_mode);
    }

    #[test]
    fn bad_protocol_override_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "TOOLRELAY_PROTOCOL").then(|| "carrier-pigeon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("agent_max_steps = 6"));
        assert!(toml_str.contains("chat_completions"));
    }
}
