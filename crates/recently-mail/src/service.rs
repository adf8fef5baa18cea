use crate::{HistogramBuilder, MessagePager, MessageStore, RecentlyError};
use chrono::{DateTime, Utc};
use recently_config::SettingsStore;
use recently_core::{AggregationConfig, Histogram, MessageRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// The state readers observe between refreshes. `messages` and `histogram`
/// are always replaced together.
#[derive(Debug, Clone, Default)]
pub struct AggregationState {
    pub config: AggregationConfig,
    pub messages: Arc<Vec<MessageRecord>>,
    pub histogram: Arc<Histogram>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    pub histogram: Arc<Histogram>,
    pub config: AggregationConfig,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub lookback_days: u32,
    pub messages: usize,
    pub senders: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This call ran the fetch; carries the last completed refresh.
    Refreshed(RefreshSummary),
    /// A refresh was already in flight; it will run once more when done.
    Coalesced,
}

/// Owner of the sender histogram.
///
/// At most one window fetch runs at a time. Refresh requests that arrive
/// while one is in flight collapse into a single trailing refresh.
pub struct Aggregator {
    pager: MessagePager,
    builder: HistogramBuilder,
    settings: Arc<dyn SettingsStore>,
    state: RwLock<AggregationState>,
    gate: Mutex<()>,
    pending: AtomicBool,
}

impl Aggregator {
    /// Loads the lookback setting once. Nothing is fetched until the first refresh.
    pub fn initialize(
        store: Arc<dyn MessageStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self, RecentlyError> {
        let config = settings.load()?.aggregation();
        tracing::info!(lookback_days = config.lookback_days, "sender histogram initialized");

        Ok(Self {
            pager: MessagePager::new(store),
            builder: HistogramBuilder::new(),
            settings,
            state: RwLock::new(AggregationState {
                config,
                ..AggregationState::default()
            }),
            gate: Mutex::new(()),
            pending: AtomicBool::new(false),
        })
    }

    pub fn with_builder(mut self, builder: HistogramBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// The last completed histogram. Never waits for an in-flight fetch.
    pub async fn snapshot(&self) -> HistogramSnapshot {
        let state = self.state.read().await;
        HistogramSnapshot {
            histogram: state.histogram.clone(),
            config: state.config,
            refreshed_at: state.refreshed_at,
        }
    }

    pub async fn state(&self) -> AggregationState {
        self.state.read().await.clone()
    }

    pub async fn config(&self) -> AggregationConfig {
        self.state.read().await.config
    }

    pub fn is_refreshing(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome, RecentlyError> {
        self.pending.store(true, Ordering::SeqCst);
        match self.gate.try_lock() {
            Ok(guard) => self.drain(guard).await,
            Err(_) => {
                tracing::debug!("refresh already in flight, coalescing");
                Ok(RefreshOutcome::Coalesced)
            }
        }
    }

    pub async fn set_lookback_days(&self, days: i64) -> Result<RefreshOutcome, RecentlyError> {
        let config = AggregationConfig::new(days).ok_or_else(|| {
            RecentlyError::InvalidConfig(format!(
                "lookback must be a positive number of days, got {days}"
            ))
        })?;
        self.update_config(config).await
    }

    /// Waits for any in-flight refresh, persists and applies `config`, then
    /// refreshes immediately. On a settings error nothing changes.
    pub async fn update_config(
        &self,
        config: AggregationConfig,
    ) -> Result<RefreshOutcome, RecentlyError> {
        let guard = self.gate.lock().await;

        let mut stored = self.settings.load()?;
        stored.set_aggregation(config);
        self.settings.save(&stored)?;

        self.state.write().await.config = config;
        tracing::info!(lookback_days = config.lookback_days, "lookback updated");

        self.pending.store(true, Ordering::SeqCst);
        self.drain(guard).await
    }

    /// Runs refreshes while requests are pending. A request that lands after
    /// the gate is released is picked up here unless another caller took the
    /// gate first.
    async fn drain(
        &self,
        mut guard: MutexGuard<'_, ()>,
    ) -> Result<RefreshOutcome, RecentlyError> {
        let mut last = Ok(RefreshOutcome::Coalesced);
        loop {
            while self.pending.swap(false, Ordering::SeqCst) {
                last = self.refresh_once().await.map(RefreshOutcome::Refreshed);
            }
            drop(guard);

            if !self.pending.load(Ordering::SeqCst) {
                return last;
            }
            guard = match self.gate.try_lock() {
                Ok(guard) => guard,
                Err(_) => return last,
            };
        }
    }

    async fn refresh_once(&self) -> Result<RefreshSummary, RecentlyError> {
        let lookback_days = self.state.read().await.config.lookback_days;
        let started = Instant::now();
        tracing::debug!(lookback_days, "refreshing sender histogram");

        let messages = match self.pager.fetch_window(lookback_days).await {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(lookback_days, "refresh failed, keeping previous histogram: {err}");
                return Err(err.into());
            }
        };
        let histogram = self.builder.build(&messages);

        let summary = RefreshSummary {
            lookback_days,
            messages: messages.len(),
            senders: histogram.len(),
            elapsed: started.elapsed(),
        };

        {
            let mut state = self.state.write().await;
            state.messages = Arc::new(messages);
            state.histogram = Arc::new(histogram);
            state.refreshed_at = Some(Utc::now());
        }

        tracing::info!(
            lookback_days,
            messages = summary.messages,
            senders = summary.senders,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "sender histogram refreshed"
        );
        Ok(summary)
    }
}
