use crate::{AppConfig, ConfigError, SettingsStore};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const ORG: &str = "io";
const AUTHOR: &str = "Recently";
const APP: &str = "Recently";

/// TOML-backed settings living in the platform config directory.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from(ORG, AUTHOR, APP).ok_or(ConfigError::MissingDirectories)?;
        Self::at(dirs.config_dir().join("config.toml"))
    }

    /// Uses an explicit config file, writing defaults if it does not exist yet.
    pub fn at(config_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_path.into();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !config_path.exists() {
            let initial = AppConfig::default();
            let content = toml::to_string_pretty(&initial)?;
            fs::write(&config_path, content)?;
            tracing::info!(path = %config_path.display(), "wrote default config");
        }

        Ok(Self { config_path })
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let content = fs::read_to_string(&self.config_path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

impl SettingsStore for ConfigManager {
    fn load(&self) -> Result<AppConfig, ConfigError> {
        ConfigManager::load(self)
    }

    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        ConfigManager::save(self, config)
    }
}
