use crate::{MessageStore, StoreError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use recently_core::{ContinuationToken, MessageFilter, MessagePage, MessageRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub(crate) fn message(id: &str, sender: &str, days_ago: i64) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        sender: sender.to_string(),
        received_at: Utc::now() - Duration::days(days_ago),
        is_junk: false,
        subject: None,
    }
}

pub(crate) fn junk(id: &str, sender: &str, days_ago: i64) -> MessageRecord {
    MessageRecord {
        is_junk: true,
        ..message(id, sender, days_ago)
    }
}

/// Store double with predictable `t1`, `t2`, ... tokens, call accounting,
/// injectable page failures and an optional gate that holds queries open.
pub(crate) struct ScriptedStore {
    page_size: usize,
    records: Mutex<Vec<MessageRecord>>,
    listing: Mutex<Vec<Vec<MessageRecord>>>,
    failing_page: Mutex<Option<usize>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    queries: AtomicUsize,
    filters: Mutex<Vec<MessageFilter>>,
    continued: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub(crate) fn new(page_size: usize, records: Vec<MessageRecord>) -> Self {
        Self {
            page_size: page_size.max(1),
            records: Mutex::new(records),
            listing: Mutex::new(Vec::new()),
            failing_page: Mutex::new(None),
            gate: Mutex::new(None),
            queries: AtomicUsize::new(0),
            filters: Mutex::new(Vec::new()),
            continued: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_records(&self, records: Vec<MessageRecord>) {
        *self.records.lock().unwrap() = records;
    }

    /// Fails page `index` (zero based) of every listing until cleared.
    pub(crate) fn fail_page(&self, index: usize) {
        *self.failing_page.lock().unwrap() = Some(index);
    }

    pub(crate) fn clear_failure(&self) {
        *self.failing_page.lock().unwrap() = None;
    }

    /// Queries wait for a permit on the returned semaphore before answering.
    pub(crate) fn hold_queries(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn last_filter(&self) -> Option<MessageFilter> {
        self.filters.lock().unwrap().last().cloned()
    }

    pub(crate) fn filters(&self) -> Vec<MessageFilter> {
        self.filters.lock().unwrap().clone()
    }

    pub(crate) fn continued_tokens(&self) -> Vec<String> {
        self.continued.lock().unwrap().clone()
    }

    fn page(&self, index: usize) -> Result<MessagePage, StoreError> {
        if *self.failing_page.lock().unwrap() == Some(index) {
            return Err(StoreError::Unavailable(format!("scripted failure on page {index}")));
        }

        let listing = self.listing.lock().unwrap();
        let records = listing.get(index).cloned().unwrap_or_default();
        let continuation = (index + 1 < listing.len())
            .then(|| ContinuationToken::new(format!("t{}", index + 1)));
        Ok(MessagePage {
            records,
            continuation,
        })
    }
}

#[async_trait]
impl MessageStore for ScriptedStore {
    async fn query_messages(&self, filter: &MessageFilter) -> Result<MessagePage, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.filters.lock().unwrap().push(filter.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|err| StoreError::Unavailable(err.to_string()))?
                .forget();
        }

        let pages = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.received_at > filter.received_after)
            .cloned()
            .collect::<Vec<_>>()
            .chunks(self.page_size)
            .map(<[MessageRecord]>::to_vec)
            .collect::<Vec<_>>();
        *self.listing.lock().unwrap() = pages;

        self.page(0)
    }

    async fn continue_messages(
        &self,
        token: &ContinuationToken,
    ) -> Result<MessagePage, StoreError> {
        self.continued.lock().unwrap().push(token.to_string());
        let index = token
            .as_str()
            .strip_prefix('t')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n < self.listing.lock().unwrap().len())
            .ok_or_else(|| StoreError::UnknownToken(token.to_string()))?;
        self.page(index)
    }
}
