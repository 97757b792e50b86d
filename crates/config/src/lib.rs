//! Configuration loading, validation, and management for Noteloom.
//!
//! Loads configuration from `~/.noteloom/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The `[prompts]` section is also runtime state: prompt migration and the
//! file-sync handlers rewrite the legacy prompt and the default prompt title
//! through a [`SharedPromptSettings`] handle, and the CLI persists the result
//! with [`AppConfig::save_to`].

use noteloom_core::message::ProjectProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// The root configuration structure.
///
/// Maps directly to `~/.noteloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Vault location
    #[serde(default)]
    pub vault: VaultConfig,

    /// System prompt settings
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Conversation and tool-loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Project profiles selectable per conversation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectProfile>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
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
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("vault", &self.vault)
            .field("prompts", &self.prompts)
            .field("agent", &self.agent)
            .field("projects", &self.projects)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault root directory. Falls back to the current directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Vault folder holding one markdown file per saved prompt
    #[serde(default = "default_prompts_folder")]
    pub folder: String,

    /// Legacy single free-text custom prompt; emptied once migrated
    #[serde(default)]
    pub user_system_prompt: String,

    /// Title of the saved prompt used as the user layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_prompt_title: Option<String>,

    /// Drop the builtin instruction layer
    #[serde(default)]
    pub disable_builtin: bool,
}

fn default_prompts_folder() -> String {
    "noteloom/system-prompts".into()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            folder: default_prompts_folder(),
            user_system_prompt: String::new(),
            default_prompt_title: None,
            disable_builtin: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on model calls per turn in the tool loop
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Trailing-edge debounce for prompt file modifications
    #[serde(default = "default_sync_debounce_ms")]
    pub sync_debounce_ms: u64,

    /// Minimum spacing between two rate-limit notices
    #[serde(default = "default_rate_limit_notice_secs")]
    pub rate_limit_notice_secs: u64,

    /// Whether the active note is inlined into outgoing messages
    #[serde(default = "default_true")]
    pub include_active_note: bool,
}

fn default_max_tool_iterations() -> u32 {
    4
}
fn default_sync_debounce_ms() -> u64 {
    1000
}
fn default_rate_limit_notice_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            sync_debounce_ms: default_sync_debounce_ms(),
            rate_limit_notice_secs: default_rate_limit_notice_secs(),
            include_active_note: true,
        }
    }
}

/// Runtime handle on the prompt settings, shared by the composer, the cache
/// sync handlers and prompt migration.
pub type SharedPromptSettings = Arc<RwLock<PromptsConfig>>;

impl PromptsConfig {
    pub fn into_shared(self) -> SharedPromptSettings {
        Arc::new(RwLock::new(self))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.noteloom/config.toml).
    ///
    /// Also checks environment variables:
    /// - `NOTELOOM_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `NOTELOOM_MODEL`
    /// - `NOTELOOM_VAULT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("NOTELOOM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("NOTELOOM_MODEL") {
            config.default_model = model;
        }

        if let Ok(vault) = std::env::var("NOTELOOM_VAULT") {
            config.vault.root = Some(vault);
        }

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

    /// Write the configuration as TOML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".noteloom")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// The vault root, falling back to the current directory.
    pub fn vault_root(&self) -> PathBuf {
        self.vault
            .root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Look up a project profile by name.
    pub fn project(&self, name: &str) -> Option<&ProjectProfile> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }

        let folder = self.prompts.folder.trim_matches('/');
        if folder.is_empty() {
            return Err(ConfigError::ValidationError(
                "prompts.folder must not be the vault root".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            vault: VaultConfig::default(),
            prompts: PromptsConfig::default(),
            agent: AgentConfig::default(),
            projects: vec![],
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

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
