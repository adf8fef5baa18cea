use thiserror::Error;

/// Failures reported by a [`crate::MessageStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mail parse error: {0}")]
    Parse(#[from] mailparse::MailParseError),
    #[error("unknown continuation token: {0}")]
    UnknownToken(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid data: {0}")]
    Data(String),
}

#[derive(Debug, Error)]
pub enum RecentlyError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] StoreError),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("settings error: {0}")]
    Settings(#[from] recently_config::ConfigError),
}
