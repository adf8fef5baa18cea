mod error;
mod manager;
mod model;
mod store;

pub use error::ConfigError;
pub use manager::ConfigManager;
pub use model::*;
pub use store::{MemorySettingsStore, SettingsStore};
