//! Configuration loading, validation, and management for Wayfarer.
//!
//! Loads configuration from `~/.wayfarer/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.wayfarer/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Token budget configuration
    #[serde(default)]
    pub budget: BudgetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Root directory holding `<trip_id>/<agent>.<extension>` documents.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Document file extension (without the dot).
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Memory-eligible agents. Must match the builder registry exactly.
    #[serde(default = "default_agents")]
    pub agents: Vec<String>,

    /// Agents allowed to accumulate notes. Must be a subset of `agents`.
    #[serde(default = "default_notes_agents")]
    pub notes_agents: Vec<String>,

    #[serde(default = "default_max_pinned")]
    pub max_pinned: usize,

    #[serde(default = "default_max_ephemeral")]
    pub max_ephemeral: usize,

    /// Cap on cross-agent insight lines per document.
    #[serde(default = "default_max_shared")]
    pub max_shared: usize,

    /// Documents larger than this trigger a warning on write.
    #[serde(default = "default_size_warn_bytes")]
    pub size_warn_bytes: usize,

    /// Trips untouched for longer than this are removed by the sweep.
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u32,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/trips")
}
fn default_extension() -> String {
    "md".into()
}
fn default_agents() -> Vec<String> {
    ["research", "planner", "scheduler", "prioritizer", "feedback", "cost"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_notes_agents() -> Vec<String> {
    ["research", "planner", "feedback"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_max_pinned() -> usize {
    10
}
fn default_max_ephemeral() -> usize {
    25
}
fn default_max_shared() -> usize {
    15
}
fn default_size_warn_bytes() -> usize {
    50 * 1024
}
fn default_stale_after_days() -> u32 {
    90
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            extension: default_extension(),
            agents: default_agents(),
            notes_agents: default_notes_agents(),
            max_pinned: default_max_pinned(),
            max_ephemeral: default_max_ephemeral(),
            max_shared: default_max_shared(),
            size_warn_bytes: default_size_warn_bytes(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total input tokens available to the downstream model.
    #[serde(default = "default_input_tokens")]
    pub input_tokens: usize,

    /// Output tokens reserved for agents without an explicit entry.
    #[serde(default = "default_output_tokens")]
    pub default_output_tokens: usize,

    /// Output tokens reserved per agent.
    #[serde(default = "default_agent_output_tokens")]
    pub output_tokens: HashMap<String, usize>,
}

fn default_input_tokens() -> usize {
    160_000
}
fn default_output_tokens() -> usize {
    4096
}
fn default_agent_output_tokens() -> HashMap<String, usize> {
    HashMap::from([
        ("research".to_string(), 16_384),
        ("planner".to_string(), 16_384),
        ("scheduler".to_string(), 8192),
        ("prioritizer".to_string(), 8192),
    ])
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            input_tokens: default_input_tokens(),
            default_output_tokens: default_output_tokens(),
            output_tokens: default_agent_output_tokens(),
        }
    }
}

impl BudgetConfig {
    /// Output tokens reserved for `agent`.
    pub fn output_tokens_for(&self, agent: &str) -> usize {
        self.output_tokens
            .get(agent)
            .copied()
            .unwrap_or(self.default_output_tokens)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.wayfarer/config.toml).
    ///
    /// Environment overrides:
    /// - `WAYFARER_STORAGE_ROOT` replaces `memory.storage_root`
    /// - `WAYFARER_INPUT_BUDGET` replaces `budget.input_tokens`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_file(&Self::config_dir().join("config.toml"))
    }

    /// Load `path` and apply the same environment overrides as [`AppConfig::load`].
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_file_with(path, |key| std::env::var(key).ok())
    }

    /// [`AppConfig::load_file`] with an injectable environment lookup.
    pub fn load_file_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without environment
    /// overrides.
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

    /// Apply environment overrides through `lookup` (injectable for tests).
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(root) = lookup("WAYFARER_STORAGE_ROOT").filter(|r| !r.trim().is_empty()) {
            self.memory.storage_root = PathBuf::from(root);
        }
        if let Some(budget) = lookup("WAYFARER_INPUT_BUDGET") {
            self.budget.input_tokens = budget.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "WAYFARER_INPUT_BUDGET must be a positive integer, got '{budget}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".wayfarer")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let memory = &self.memory;
        if memory.max_pinned == 0 || memory.max_ephemeral == 0 || memory.max_shared == 0 {
            return Err(ConfigError::ValidationError(
                "max_pinned, max_ephemeral and max_shared must be > 0".into(),
            ));
        }

        if memory.extension.is_empty()
            || memory.extension.contains(['/', '\\', '.'])
        {
            return Err(ConfigError::ValidationError(format!(
                "extension '{}' must be a bare file extension",
                memory.extension
            )));
        }

        if let Some(stray) = memory
            .notes_agents
            .iter()
            .find(|a| !memory.agents.contains(a))
        {
            return Err(ConfigError::ValidationError(format!(
                "notes agent '{stray}' is not listed in memory.agents"
            )));
        }

        if self.budget.input_tokens <= self.budget.default_output_tokens {
            return Err(ConfigError::ValidationError(
                "budget.input_tokens must exceed budget.default_output_tokens".into(),
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
