//! Application configuration for outlinekb.
//!
//! User config lives at `~/.outlinekb/outlinekb.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OutlineKbError, Result};
use crate::types::{ConceptMode, WritePolicy};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "outlinekb.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".outlinekb";

// ---------------------------------------------------------------------------
// Config structs (matching outlinekb.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Knowledge-base generation settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Outline discovery and parsing.
    #[serde(default)]
    pub outline: OutlineConfig,

    /// Completion service used to answer hooks.
    #[serde(default)]
    pub completion: CompletionConfig,
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// What to do with files that already exist.
    #[serde(default)]
    pub write_policy: WritePolicy,

    /// Appended to the outline's base name to form the overview note name.
    #[serde(default = "default_overview_suffix")]
    pub overview_suffix: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            write_policy: WritePolicy::default(),
            overview_suffix: default_overview_suffix(),
        }
    }
}

fn default_overview_suffix() -> String {
    "学习总览".into()
}

/// `[outline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineConfig {
    /// Extension of outline files considered by auto-detection.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// File-name prefixes that auto-detection never picks.
    #[serde(default = "default_exclude_prefixes")]
    pub exclude_prefixes: Vec<String>,

    /// How italic core-concept lines are recognized.
    #[serde(default)]
    pub concept_mode: ConceptMode,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            exclude_prefixes: default_exclude_prefixes(),
            concept_mode: ConceptMode::default(),
        }
    }
}

fn default_extension() -> String {
    "md".into()
}
fn default_exclude_prefixes() -> Vec<String> {
    ["通用", "全自动", "create", "总览"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base, without the `/chat/completions` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature; kept low for focused answers.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extension of files gathered as hook context.
    #[serde(default = "default_extension")]
    pub context_extension: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            context_extension: default_extension(),
        }
    }
}

fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.deepseek.com/v1".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_timeout_secs() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.outlinekb/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| OutlineKbError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.outlinekb/outlinekb.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| OutlineKbError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        OutlineKbError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Read the completion API key from the configured env var.
pub fn resolve_api_key(config: &CompletionConfig) -> Result<String> {
    let var_name = &config.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(OutlineKbError::config(format!(
            "completion API key not found. Set the {var_name} environment variable."
        ))),
    }
}
