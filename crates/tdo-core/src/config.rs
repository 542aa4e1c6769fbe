//! Configuration management for tdo.
//!
//! Loads configuration from `${TDO_HOME}/config.toml` with sensible defaults.
//! Base URLs can also be overridden per invocation through environment
//! variables (`TDO_PROVIDER_BASE_URL`, `TDO_BACKEND_BASE_URL`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Auth provider endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the third-party auth provider.
    pub base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: Config::DEFAULT_PROVIDER_BASE_URL.to_string(),
        }
    }
}

/// Backend API endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the task backend.
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Config::DEFAULT_BACKEND_BASE_URL.to_string(),
        }
    }
}

/// Session-poll timing for the identity bridge.
///
/// The provider session materializes asynchronously after sign-in returns;
/// these values bound how long the bridge waits for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Delay before the first session check, in milliseconds.
    pub initial_delay_ms: u64,
    /// Delay between subsequent checks, in milliseconds.
    pub poll_delay_ms: u64,
    /// Re-checks after the initial one.
    pub max_polls: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            poll_delay_ms: 200,
            max_polls: 5,
        }
    }
}

/// Backend user resolution timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Single settling delay before the who-am-I call, in milliseconds.
    pub settle_delay_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 150,
        }
    }
}

impl ResolverConfig {
    /// Returns the settling delay as a `Duration`.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Auth provider endpoint.
    pub provider: ProviderConfig,

    /// Task backend endpoint.
    pub backend: BackendConfig,

    /// Identity bridge poll budget.
    pub bridge: BridgeConfig,

    /// Backend user resolver timing.
    pub resolver: ResolverConfig,
}

impl Config {
    const DEFAULT_PROVIDER_BASE_URL: &str = "http://localhost:3000";
    const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:8000";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Resolves the auth provider base URL (env > config > default).
    pub fn provider_base_url(&self) -> Result<String> {
        resolve_base_url(
            Some(&self.provider.base_url),
            "TDO_PROVIDER_BASE_URL",
            Self::DEFAULT_PROVIDER_BASE_URL,
            "provider",
        )
    }

    /// Resolves the task backend base URL (env > config > default).
    pub fn backend_base_url(&self) -> Result<String> {
        resolve_base_url(
            Some(&self.backend.base_url),
            "TDO_BACKEND_BASE_URL",
            Self::DEFAULT_BACKEND_BASE_URL,
            "backend",
        )
    }

    /// Writes the commented default config template.
    ///
    /// # Errors
    /// Fails if a config file already exists at `path`.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content atomically (tmp file + rename).
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Resolves a base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if the chosen URL is not well-formed.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
    component: &str,
) -> Result<String> {
    // Try env var first
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, component)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    // Try config value
    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, component)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    // Default
    Ok(default_url.to_string())
}

/// Validates that a URL is well-formed.
fn validate_url(url: &str, component: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid {component} base URL: {url}"))?;
    Ok(())
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for tdo configuration and credential files.
    //!
    //! TDO_HOME resolution order:
    //! 1. TDO_HOME environment variable (if set)
    //! 2. ~/.config/tdo (default)

    use std::path::PathBuf;

    /// Returns the tdo home directory.
    ///
    /// Checks TDO_HOME env var first, falls back to ~/.config/tdo
    pub fn tdo_home() -> PathBuf {
        if let Ok(home) = std::env::var("TDO_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("tdo"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        tdo_home().join("config.toml")
    }

    /// Returns the path to the persisted credential file.
    pub fn credentials_path() -> PathBuf {
        tdo_home().join("credentials.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: missing file yields defaults.
    #[test]
    fn test_load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.provider.base_url, "http://localhost:3000");
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.bridge.max_polls, 5);
        assert_eq!(config.resolver.settle_delay_ms, 150);
    }

    /// Test: partial config files keep defaults for absent sections.
    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nbase_url = \"http://api.example.com\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backend.base_url, "http://api.example.com");
        assert_eq!(config.provider.base_url, "http://localhost:3000");
        assert_eq!(config.bridge.initial_delay_ms, 100);
    }

    /// Test: the embedded template parses back into a Config.
    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(config.bridge.poll_delay_ms, 200);
    }

    /// Test: malformed base URLs are rejected.
    #[test]
    fn test_resolve_base_url_rejects_invalid() {
        let result = resolve_base_url(
            Some("not a url"),
            "TDO_TEST_UNSET_ENV_VAR",
            "http://localhost:1",
            "provider",
        );
        assert!(result.is_err());
    }

    /// Test: trailing slashes are stripped so joined paths stay clean.
    #[test]
    fn test_resolve_base_url_strips_trailing_slash() {
        let url = resolve_base_url(
            Some("http://localhost:9000/"),
            "TDO_TEST_UNSET_ENV_VAR",
            "http://localhost:1",
            "backend",
        )
        .unwrap();
        assert_eq!(url, "http://localhost:9000");
    }
}
