use crate::{AppConfig, ConfigError};
use std::sync::{Mutex, PoisonError};

/// Key-value persistence for user settings. Read once at startup and written
/// whenever the options change.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<AppConfig, ConfigError>;
    fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;
}

/// Settings kept only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    config: Mutex<AppConfig>,
    saves: Mutex<usize>,
}

impl MemorySettingsStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Mutex::new(config),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<AppConfig, ConfigError> {
        Ok(self
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config.clone();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
