//! Configuration management for the Lighthouse tools.
//!
//! This module handles loading, saving, and managing user configuration
//! including profiles and application settings. API tokens are kept in the
//! OS keyring, never in the config file.

mod credentials;
mod profile;
mod settings;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use credentials::{resolve_credentials, CredentialOverrides, Credentials};
pub use profile::Profile;
pub use settings::Settings;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "LH_CONFIG";

/// Errors that can occur while loading or using configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    NoConfigDir,

    #[error("failed to create configuration directory: {0}")]
    CreateDirError(#[source] std::io::Error),

    #[error("failed to read configuration file: {0}")]
    ReadError(#[source] std::io::Error),

    #[error("failed to write configuration file: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),

    #[error("profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Location of the config file: `$LH_CONFIG`, or
    /// `<config dir>/lighthouse/config.toml`.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("lighthouse").join("config.toml"))
    }

    /// Load the config file, or defaults when it does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load and validate a config file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), profiles = config.profiles.len(), "Loaded config");
        Ok(config)
    }

    /// Validate and save to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Validate and save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::CreateDirError)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(ConfigError::WriteError)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Check every profile, name uniqueness and the default profile.
    pub fn validate(&self) -> Result<()> {
        for (i, profile) in self.profiles.iter().enumerate() {
            profile.validate()?;
            if self.profiles[..i].iter().any(|p| p.name == profile.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate profile name '{}'",
                    profile.name
                )));
            }
        }

        if let Some(name) = &self.settings.default_profile {
            if self.get_profile(name).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "default profile '{}' does not exist",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The configured default profile, else the first one.
    pub fn get_default_profile(&self) -> Option<&Profile> {
        self.settings
            .default_profile
            .as_deref()
            .and_then(|name| self.get_profile(name))
            .or_else(|| self.profiles.first())
    }

    /// Add a profile, replacing any profile with the same name.
    pub fn upsert_profile(&mut self, profile: Profile) {
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    /// Remove a profile, clearing the default if it pointed there.
    pub fn remove_profile(&mut self, name: &str) -> Result<Profile> {
        let index = self
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))?;

        if self.settings.default_profile.as_deref() == Some(name) {
            self.settings.default_profile = None;
        }
        Ok(self.profiles.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn profile(name: &str) -> Profile {
        Profile::new(name.to_string(), "acme".to_string(), None)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.upsert_profile(profile("work"));
        config.settings.default_profile = Some("work".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.get_default_profile().map(|p| p.account.as_str()), Some("acme"));
    }

    #[test]
    fn test_parse_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[settings]
default_profile = "oss"

[[profiles]]
name = "work"
account = "acme"
email = "dev@acme.com"

[[profiles]]
name = "oss"
account = "rails"
token_as_basic_auth = true
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.profiles.len(), 2);
        let default = config.get_default_profile().unwrap();
        assert_eq!(default.name, "oss");
        assert!(default.token_as_basic_auth);
        assert_eq!(config.settings.host, "lighthouseapp.com");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[profiles]\nname=").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_duplicate_profiles_rejected() {
        let config = Config {
            profiles: vec![profile("work"), profile("work")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate profile"));
    }

    #[test]
    fn test_unknown_default_profile_rejected() {
        let mut config = Config::default();
        config.settings.default_profile = Some("ghost".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut config = Config::default();
        config.upsert_profile(profile("work"));
        let mut updated = profile("work");
        updated.account = "other".to_string();
        config.upsert_profile(updated);
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].account, "other");

        config.settings.default_profile = Some("work".to_string());
        config.remove_profile("work").unwrap();
        assert!(config.settings.default_profile.is_none());
        assert!(matches!(
            config.remove_profile("work"),
            Err(ConfigError::ProfileNotFound(_))
        ));
    }

    #[test]
    #[serial]
    fn test_config_path_env_override() {
        std::env::set_var(CONFIG_ENV, "/tmp/lh-test/config.toml");
        let path = Config::config_path().unwrap();
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(path, PathBuf::from("/tmp/lh-test/config.toml"));
    }

    #[test]
    #[serial]
    fn test_default_config_path() {
        std::env::remove_var(CONFIG_ENV);
        if let Ok(path) = Config::config_path() {
            assert!(path.ends_with("lighthouse/config.toml"));
        }
    }
}
