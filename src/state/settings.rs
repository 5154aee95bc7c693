//! Persisted user settings.
//!
//! All flags the controller remembers between runs live in one [`Settings`]
//! value. It is read once at startup and written back whenever one of its
//! fields changes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::state::TunnelKind;

/// Settings persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to create settings directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What the user last asked a tunnel to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredState {
    pub kind: TunnelKind,
    pub user_wants_enabled: bool,
}

/// Counters feeding the review prompt decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingGateState {
    #[serde(default = "Utc::now")]
    pub install_date: DateTime<Utc>,
    #[serde(default)]
    pub rating_count: u32,
    #[serde(default)]
    pub rating_triggered_count: u32,
    #[serde(default)]
    pub is_pre_release_build: bool,
    /// App version the counters belong to.
    #[serde(default = "current_version_key")]
    pub version_key: String,
}

fn current_version_key() -> String {
    constants::RATING_VERSION_KEY.to_string()
}

impl Default for RatingGateState {
    fn default() -> Self {
        Self {
            install_date: Utc::now(),
            rating_count: 0,
            rating_triggered_count: 0,
            is_pre_release_build: false,
            version_key: current_version_key(),
        }
    }
}

impl RatingGateState {
    /// Reset the counters if they were recorded for another version.
    ///
    /// Returns `true` when a reset happened.
    pub fn scope_to_version(&mut self, version_key: &str) -> bool {
        if self.version_key == version_key {
            return false;
        }
        self.rating_count = 0;
        self.rating_triggered_count = 0;
        self.version_key = version_key.to_string();
        true
    }
}

/// Every persisted flag, in one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Settings {
    #[serde(default)]
    pub user_wants_filter_enabled: bool,
    #[serde(default)]
    pub user_wants_secure_tunnel_enabled: bool,
    #[serde(default)]
    pub has_agreed_to_filter_policy: bool,
    #[serde(default)]
    pub has_seen_initial_filter_connected_dialog: bool,
    #[serde(default)]
    pub rating: RatingGateState,
}

impl Settings {
    #[must_use]
    pub fn desired(&self, kind: TunnelKind) -> DesiredState {
        let user_wants_enabled = match kind {
            TunnelKind::Filter => self.user_wants_filter_enabled,
            TunnelKind::SecureTunnel => self.user_wants_secure_tunnel_enabled,
        };
        DesiredState {
            kind,
            user_wants_enabled,
        }
    }

    pub fn set_desired(&mut self, kind: TunnelKind, enabled: bool) {
        match kind {
            TunnelKind::Filter => self.user_wants_filter_enabled = enabled,
            TunnelKind::SecureTunnel => self.user_wants_secure_tunnel_enabled = enabled,
        }
    }
}

/// Load/save contract for [`Settings`].
pub trait SettingsStore: Send {
    /// Read persisted settings, falling back to defaults.
    fn load(&self) -> Settings;

    /// Persist `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be serialized or written.
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// Settings stored as TOML on disk.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `settings.toml` inside `config_dir`.
    #[must_use]
    pub fn in_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(constants::SETTINGS_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> Settings {
        // `fresh` marks values invented here that must not change between runs.
        let (mut settings, mut fresh) = match std::fs::read_to_string(&self.path) {
            Ok(content) => match parse(&content) {
                Ok((settings, dated)) => {
                    log::info!("[settings] loaded from {}", self.path.display());
                    (settings, !dated)
                }
                Err(error) => {
                    log::warn!(
                        "[settings] failed to parse {}: {error}",
                        self.path.display()
                    );
                    (Settings::default(), true)
                }
            },
            Err(_) => {
                log::info!(
                    "[settings] no settings file at {}, using defaults",
                    self.path.display()
                );
                (Settings::default(), true)
            }
        };

        if settings
            .rating
            .scope_to_version(constants::RATING_VERSION_KEY)
        {
            log::info!(
                "[settings] rating counters reset for version {}",
                constants::RATING_VERSION_KEY
            );
            fresh = true;
        }
        if fresh {
            if let Err(e) = self.save(&settings) {
                log::warn!("[settings] failed to record install date: {e}");
            }
        }
        settings
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(settings)?;
        std::fs::write(&self.path, content).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Parse settings, reporting whether the install date was present.
fn parse(content: &str) -> Result<(Settings, bool), toml::de::Error> {
    let table: toml::Table = toml::from_str(content)?;
    let dated = table
        .get("rating")
        .and_then(|rating| rating.get("install_date"))
        .is_some();
    let settings = toml::Value::Table(table).try_into()?;
    Ok((settings, dated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> TomlSettingsStore {
        let dir = std::env::temp_dir().join(format!("lockdown-settings-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        TomlSettingsStore::in_dir(&dir)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let store = temp_store("missing");
        let settings = store.load();
        assert!(!settings.user_wants_filter_enabled);
        assert!(!settings.has_agreed_to_filter_policy);
        assert_eq!(settings.rating.rating_count, 0);
        assert_eq!(settings.rating.version_key, constants::RATING_VERSION_KEY);

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap());
    }

    #[test]
    fn test_save_then_load() {
        let store = temp_store("save");
        let mut settings = Settings::default();
        settings.set_desired(TunnelKind::Filter, true);
        settings.has_agreed_to_filter_policy = true;
        settings.rating.rating_count = 5;

        store.save(&settings).unwrap();
        let loaded = store.load();
        assert_eq!(loaded, settings);
        assert!(loaded.desired(TunnelKind::Filter).user_wants_enabled);
        assert!(!loaded.desired(TunnelKind::SecureTunnel).user_wants_enabled);

        if let Some(parent) = store.path().parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let store = temp_store("corrupt");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "this is = = not toml").unwrap();
        assert_eq!(store.load().rating.rating_count, 0);

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap());
    }

    #[test]
    fn test_install_date_survives_restarts() {
        let store = temp_store("install-date");
        let first = store.load();
        assert!(store.path().exists());

        let second = store.load();
        assert_eq!(second.rating.install_date, first.rating.install_date);

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap());
    }

    #[test]
    fn test_partial_rating_table_keeps_other_settings() {
        let store = temp_store("partial");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            "has_agreed_to_filter_policy = true\nuser_wants_filter_enabled = true\n\n[rating]\nrating_count = 5\n",
        )
        .unwrap();

        let loaded = store.load();
        assert!(loaded.has_agreed_to_filter_policy);
        assert!(loaded.user_wants_filter_enabled);
        assert_eq!(loaded.rating.rating_count, 5);
        assert_eq!(loaded.rating.version_key, constants::RATING_VERSION_KEY);

        // The invented install date is written back and reused.
        let written = std::fs::read_to_string(store.path()).unwrap();
        assert!(written.contains("install_date"));
        assert_eq!(store.load().rating.install_date, loaded.rating.install_date);

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap());
    }

    #[test]
    fn test_version_reset_is_persisted() {
        let store = temp_store("version-reset");
        let mut settings = Settings::default();
        settings.rating.rating_count = 9;
        settings.rating.version_key = "0.9".to_string();
        store.save(&settings).unwrap();

        assert_eq!(store.load().rating.rating_count, 0);
        let written = std::fs::read_to_string(store.path()).unwrap();
        assert!(written.contains(&format!("version_key = \"{}\"", constants::RATING_VERSION_KEY)));

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap());
    }

    #[test]
    fn test_counters_scoped_to_version() {
        let mut rating = RatingGateState {
            rating_count: 12,
            rating_triggered_count: 2,
            version_key: "0.9".to_string(),
            ..RatingGateState::default()
        };
        assert!(rating.scope_to_version("1.0"));
        assert_eq!(rating.rating_count, 0);
        assert_eq!(rating.rating_triggered_count, 0);
        assert!(!rating.scope_to_version("1.0"));
    }
}
