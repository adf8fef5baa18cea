mod backend;
mod error;
mod histogram;
mod pager;
mod query;
mod scheduler;
mod service;
mod watcher;

#[cfg(test)]
mod test_support;

pub use backend::{MaildirFingerprint, MaildirStore, MemoryMessageStore, MessageStore};
pub use error::{RecentlyError, StoreError};
pub use histogram::HistogramBuilder;
pub use pager::{cutoff_for, MessagePager, PageCursor};
pub use query::{
    parse_lookback, ranked_senders, Options, OptionsEnvelope, OptionsUpdate, Payload, QueryHandler,
    RankedSender, Request, Response,
};
pub use scheduler::{MailEvent, RefreshScheduler, SchedulerOptions};
pub use service::{AggregationState, Aggregator, HistogramSnapshot, RefreshOutcome, RefreshSummary};
pub use watcher::spawn_maildir_watcher;
