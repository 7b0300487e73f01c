//! Bootstrap configuration loading and secret resolution
//!
//! Configuration file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `DEPUP_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/depup/config.toml` on Linux)
//! 4. Built-in defaults (fallback)
//!
//! Secrets (API keys) resolve Environment → TOML so that a checked-in config
//! file never has to carry credentials.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DEPUP_CONFIG";

/// Environment variables consulted for the reasoning service key, in order
pub const REASONING_KEY_ENV_VARS: &[&str] = &["DEPUP_REASONING_API_KEY", "GROQ_API_KEY"];

/// Environment variables consulted for the search service key, in order
pub const SEARCH_KEY_ENV_VARS: &[&str] = &["DEPUP_SEARCH_API_KEY", "TAVILY_API_KEY"];

/// Bootstrap configuration loaded from TOML file
///
/// Every table is optional; missing tables and fields fall back to built-in
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub registry: RegistryConfig,
    pub reasoning: ReasoningConfig,
    pub search: SearchConfig,
    pub hosting: HostingConfig,
    pub patcher: PatcherConfig,
    pub logging: LoggingConfig,
}

/// Package registry lookups
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Repository root serving `maven-metadata.xml` documents
    pub base_url: String,
    /// Per-lookup timeout in seconds
    pub timeout_secs: u64,
    /// Maximum in-flight lookups (defaults to the number of CPUs)
    pub max_concurrency: Option<usize>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://repo1.maven.org/maven2".to_string(),
            timeout_secs: 5,
            max_concurrency: None,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Effective worker limit, never zero
    pub fn worker_limit(&self) -> usize {
        self.max_concurrency.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// OpenAI-compatible reasoning service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
    pub temperature: Option<f32>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-8b-8192".to_string(),
            api_key: None,
            timeout_secs: 120,
            requests_per_minute: 30,
            temperature: Some(0.0),
        }
    }
}

impl ReasoningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Web search service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_results: usize,
    pub search_depth: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key: None,
            max_results: 6,
            search_depth: "basic".to_string(),
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Code hosting (pull requests) and branch naming
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostingConfig {
    pub api_base: String,
    pub base_branch: String,
    pub branch_prefix: String,
    pub pr_title: String,
    pub commit_message: String,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            base_branch: "main".to_string(),
            branch_prefix: "upgrade_deps".to_string(),
            pr_title: "Dependency Upgrade PR".to_string(),
            commit_message: "Upgrade dependencies".to_string(),
        }
    }
}

/// Source patching
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatcherConfig {
    /// File extension (without dot) of source files to patch
    pub source_extension: String,
    /// Directory names never descended into
    pub ignore_dirs: Vec<String>,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        Self {
            source_extension: "java".to_string(),
            ignore_dirs: vec![
                ".git".to_string(),
                "target".to_string(),
                "build".to_string(),
                "node_modules".to_string(),
            ],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Resolve and load configuration
    ///
    /// An explicitly named file (CLI or `DEPUP_CONFIG`) must exist. The
    /// platform default location is optional; when absent, built-in defaults
    /// are used.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_config_path(cli_path) {
            return Self::load_from(&path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("registry.base_url", &self.registry.base_url),
            ("reasoning.base_url", &self.reasoning.base_url),
            ("search.base_url", &self.search.base_url),
            ("hosting.api_base", &self.hosting.api_base),
        ] {
            if url.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }

        if self.registry.timeout_secs == 0 {
            return Err(Error::Config("registry.timeout_secs must be > 0".to_string()));
        }
        if self.reasoning.timeout_secs == 0 || self.search.timeout_secs == 0 {
            return Err(Error::Config(
                "reasoning.timeout_secs and search.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.reasoning.requests_per_minute == 0 {
            return Err(Error::Config(
                "reasoning.requests_per_minute must be > 0".to_string(),
            ));
        }
        if self.registry.max_concurrency == Some(0) {
            return Err(Error::Config("registry.max_concurrency must be > 0".to_string()));
        }
        if self.search.max_results == 0 {
            return Err(Error::Config("search.max_results must be > 0".to_string()));
        }
        if self.hosting.branch_prefix.trim().is_empty() {
            return Err(Error::Config("hosting.branch_prefix must not be empty".to_string()));
        }
        if self.patcher.source_extension.trim().is_empty() {
            return Err(Error::Config("patcher.source_extension must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Config file named on the command line or via `DEPUP_CONFIG`
fn explicit_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    std::env::var(CONFIG_ENV_VAR)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

/// Platform default config location (may not exist)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("depup").join("config.toml"))
}

/// Validate secret (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve a secret from Environment → TOML
///
/// The first valid environment variable in `env_vars` wins; the TOML value is
/// used only when no environment variable is set. Logs a warning when the
/// secret is present in more than one source.
pub fn resolve_secret(label: &str, env_vars: &[&str], toml_value: Option<&str>) -> Option<String> {
    let env_hit = env_vars.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .filter(|v| is_valid_key(v))
            .map(|v| (*name, v))
    });
    let toml_hit = toml_value.filter(|v| is_valid_key(v));

    match (env_hit, toml_hit) {
        (Some((name, value)), toml) => {
            if toml.is_some() {
                warn!(
                    "{} found in environment ({}) and TOML config. Using environment.",
                    label, name
                );
            }
            info!("{} loaded from environment variable {}", label, name);
            Some(value)
        }
        (None, Some(value)) => {
            info!("{} loaded from TOML config", label);
            Some(value.to_string())
        }
        (None, None) => None,
    }
}
