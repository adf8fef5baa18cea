use recently_core::{AggregationConfig, DEFAULT_LOOKBACK_DAYS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub version: u32,
    #[serde(default)]
    pub histogram: HistogramConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistogramConfig {
    /// Stored as written by the user; validated when turned into an [`AggregationConfig`].
    pub lookback_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub debounce_ms: u64,
    pub startup_delay_ms: u64,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub page_size: usize,
    pub maildir: Option<PathBuf>,
}

impl AppConfig {
    /// The aggregation settings, falling back to the default lookback when the
    /// stored value is not a positive number of days.
    pub fn aggregation(&self) -> AggregationConfig {
        match AggregationConfig::new(self.histogram.lookback_days) {
            Some(config) => config,
            None => {
                tracing::warn!(
                    lookback_days = self.histogram.lookback_days,
                    "ignoring invalid stored lookback, using default"
                );
                AggregationConfig::default()
            }
        }
    }

    pub fn set_aggregation(&mut self, config: AggregationConfig) {
        self.histogram.lookback_days = i64::from(config.lookback_days);
    }
}

impl SchedulerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            lookback_days: i64::from(DEFAULT_LOOKBACK_DAYS),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            startup_delay_ms: 2000,
            poll_interval_secs: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            maildir: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            histogram: HistogramConfig::default(),
            scheduler: SchedulerConfig::default(),
            store: StoreConfig::default(),
        }
    }
}
