//! Turns mail-store notifications into debounced histogram refreshes.
//!
//! A single consumer task owns the refresh loop. Notifications are queued on
//! an unbounded channel, so none is lost while a refresh is running; every
//! batch of notifications received within the debounce window, or while the
//! previous refresh was in flight, collapses into one refresh.

use crate::Aggregator;
use recently_config::SchedulerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailEvent {
    NewMailArrived,
    MessageMetadataChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub debounce: Duration,
    /// Delay before the first refresh; `None` waits for the first event.
    pub startup_delay: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            debounce: config.debounce(),
            startup_delay: Some(config.startup_delay()),
        }
    }
}

/// Cloneable handle feeding the refresh loop. The loop stops once every
/// handle has been dropped.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    events: mpsc::UnboundedSender<MailEvent>,
}

impl RefreshScheduler {
    pub fn spawn(aggregator: Arc<Aggregator>, options: SchedulerOptions) -> (Self, JoinHandle<()>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(aggregator, options, receiver));
        (Self { events }, task)
    }

    /// Returns `false` when the refresh loop is no longer running.
    pub fn notify(&self, event: MailEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn new_mail_arrived(&self) -> bool {
        self.notify(MailEvent::NewMailArrived)
    }

    pub fn message_metadata_changed(&self) -> bool {
        self.notify(MailEvent::MessageMetadataChanged)
    }
}

async fn run(
    aggregator: Arc<Aggregator>,
    options: SchedulerOptions,
    mut events: mpsc::UnboundedReceiver<MailEvent>,
) {
    if let Some(delay) = options.startup_delay {
        sleep(delay).await;
        let absorbed = drain_pending(&mut events);
        tracing::debug!(absorbed, "initial refresh");
        refresh(&aggregator).await;
    }

    while let Some(event) = events.recv().await {
        sleep(options.debounce).await;
        let batched = 1 + drain_pending(&mut events);
        tracing::debug!(?event, batched, "debounced mail events");
        refresh(&aggregator).await;
    }

    tracing::info!("refresh scheduler stopped");
}

fn drain_pending(events: &mut mpsc::UnboundedReceiver<MailEvent>) -> usize {
    let mut drained = 0;
    while events.try_recv().is_ok() {
        drained += 1;
    }
    drained
}

async fn refresh(aggregator: &Aggregator) {
    if let Err(err) = aggregator.refresh().await {
        tracing::warn!("scheduled refresh failed: {err}");
    }
}
