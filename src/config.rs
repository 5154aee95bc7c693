//! Static configuration loaded from `config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::constants;

/// Errors that prevent the config from being used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a config directory")]
    NoConfigDir,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid API base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}

/// Subscription API settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Purchase receipt sent on sign-in.
    pub receipt_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: constants::API_TIMEOUT_SECS,
            receipt_path: None,
        }
    }
}

impl ApiConfig {
    /// Base URL with a trailing slash so endpoint paths join beneath it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BaseUrl`] if the URL does not parse.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(Url::parse(&raw)?)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Shell commands that drive one tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TunnelCommands {
    pub up: Option<String>,
    pub down: Option<String>,
    /// Exit status 0 means connected.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub filter: TunnelCommands,
    pub secure: TunnelCommands,
    /// Store review page opened by the rating prompt.
    pub review_url: Option<String>,
    /// Pre-release builds never ask for a review.
    pub pre_release: bool,
    /// Blocked-connection counters; defaults to `metrics.json` in the config dir.
    pub metrics_path: Option<PathBuf>,
}

impl Config {
    /// Load `config.toml` from `config_dir`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(constants::CONFIG_FILE_NAME);
        if !path.exists() {
            log::debug!("[config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    #[must_use]
    pub fn metrics_path(&self, config_dir: &Path) -> PathBuf {
        self.metrics_path
            .clone()
            .unwrap_or_else(|| config_dir.join(constants::METRICS_FILE_NAME))
    }
}

/// `--config-dir` if given, else the platform config directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] if no platform directory exists.
pub fn resolve_config_dir(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    dirs::config_dir()
        .map(|dir| dir.join(constants::CONFIG_DIR_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lockdown-config-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = temp_dir("missing");
        let config = Config::load(&dir).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.metrics_path(&dir), dir.join("metrics.json"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_partial_file() {
        let dir = temp_dir("partial");
        std::fs::write(
            dir.join("config.toml"),
            r#"
pre_release = true

[api]
base_url = "https://example.test/v1"

[filter]
up = "filterctl start"
status = "filterctl running"
"#,
        )
        .unwrap();

        let config = Config::load(&dir).unwrap();
        assert!(config.pre_release);
        assert_eq!(config.api.timeout_secs, constants::API_TIMEOUT_SECS);
        assert_eq!(
            config.api.base_url().unwrap().join("signin").unwrap().as_str(),
            "https://example.test/v1/signin"
        );
        assert_eq!(config.filter.up.as_deref(), Some("filterctl start"));
        assert_eq!(config.filter.down, None);
        assert_eq!(config.secure, TunnelCommands::default());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = temp_dir("broken");
        std::fs::write(dir.join("config.toml"), "pre_release = \"maybe\"").unwrap();
        assert!(matches!(Config::load(&dir), Err(ConfigError::Parse { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_explicit_config_dir_wins() {
        let dir = PathBuf::from("/tmp/lockdown-explicit");
        assert_eq!(resolve_config_dir(Some(dir.clone())).unwrap(), dir);
    }
}
