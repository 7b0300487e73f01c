//! Configuration resolution tests
//!
//! Covers config file priority (CLI → DEPUP_CONFIG → platform default →
//! built-in defaults) and secret resolution (Environment → TOML).
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.

use depup_common::config::{resolve_secret, TomlConfig, CONFIG_ENV_VAR};
use depup_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_path_overrides_env_path() {
    let dir = TempDir::new().unwrap();
    let cli = write_config(&dir, "cli.toml", "[search]\nmax_results = 3\n");
    let from_env = write_config(&dir, "env.toml", "[search]\nmax_results = 4\n");
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let config = TomlConfig::load(Some(&cli)).unwrap();
    assert_eq!(config.search.max_results, 3);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_path_used_without_cli() {
    let dir = TempDir::new().unwrap();
    let from_env = write_config(&dir, "env.toml", "[hosting]\nbase_branch = \"develop\"\n");
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let config = TomlConfig::load(None).unwrap();
    assert_eq!(config.hosting.base_branch, "develop");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_config_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let result = TomlConfig::load(Some(&missing));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_env_secret_wins_over_toml() {
    env::set_var("DEPUP_SEARCH_API_KEY", "env-key");
    env::remove_var("TAVILY_API_KEY");

    let key = resolve_secret("Search API key", &["DEPUP_SEARCH_API_KEY", "TAVILY_API_KEY"], Some("toml-key"));
    assert_eq!(key.as_deref(), Some("env-key"));

    env::remove_var("DEPUP_SEARCH_API_KEY");
}

#[test]
#[serial]
fn test_fallback_env_var_consulted_in_order() {
    env::remove_var("DEPUP_SEARCH_API_KEY");
    env::set_var("TAVILY_API_KEY", "tavily-key");

    let key = resolve_secret("Search API key", &["DEPUP_SEARCH_API_KEY", "TAVILY_API_KEY"], None);
    assert_eq!(key.as_deref(), Some("tavily-key"));

    env::remove_var("TAVILY_API_KEY");
}

#[test]
#[serial]
fn test_toml_secret_used_when_env_empty() {
    env::set_var("DEPUP_SEARCH_API_KEY", "   ");
    env::remove_var("TAVILY_API_KEY");

    let key = resolve_secret("Search API key", &["DEPUP_SEARCH_API_KEY", "TAVILY_API_KEY"], Some("toml-key"));
    assert_eq!(key.as_deref(), Some("toml-key"));

    let none = resolve_secret("Search API key", &["DEPUP_SEARCH_API_KEY", "TAVILY_API_KEY"], Some(""));
    assert!(none.is_none());

    env::remove_var("DEPUP_SEARCH_API_KEY");
}
