use crate::{MessageStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use recently_core::{ContinuationToken, MessageFilter, MessageRecord};
use std::collections::HashSet;
use std::sync::Arc;

/// Start of a lookback window ending at `now`.
pub fn cutoff_for(now: DateTime<Utc>, lookback_days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(lookback_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Retrieves every record of a time window, following continuation tokens.
#[derive(Clone)]
pub struct MessagePager {
    store: Arc<dyn MessageStore>,
}

impl MessagePager {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub async fn fetch_window(&self, lookback_days: u32) -> Result<Vec<MessageRecord>, StoreError> {
        self.fetch_since(cutoff_for(Utc::now(), lookback_days)).await
    }

    /// Drains a [`PageCursor`] into a single sequence. Any failed page fails
    /// the whole fetch and the records gathered so far are dropped.
    pub async fn fetch_since(
        &self,
        received_after: DateTime<Utc>,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let mut cursor = self.cursor(received_after);
        let mut records = Vec::new();
        while let Some(page) = cursor.next_page().await {
            records.extend(page?);
        }

        tracing::debug!(
            pages = cursor.pages_read(),
            records = records.len(),
            %received_after,
            "fetched message window"
        );
        Ok(records)
    }

    pub fn cursor(&self, received_after: DateTime<Utc>) -> PageCursor<'_> {
        PageCursor {
            store: self.store.as_ref(),
            filter: MessageFilter { received_after },
            next: Next::Query,
            seen: HashSet::new(),
            pages: 0,
        }
    }
}

enum Next {
    Query,
    Continue(ContinuationToken),
    Done,
}

/// Finite, non-restartable walk over the pages of one listing.
pub struct PageCursor<'a> {
    store: &'a dyn MessageStore,
    filter: MessageFilter,
    next: Next,
    seen: HashSet<ContinuationToken>,
    pages: usize,
}

impl PageCursor<'_> {
    /// The next page of records, or `None` once the store sent its last page.
    /// The cursor is finished after yielding an error.
    pub async fn next_page(&mut self) -> Option<Result<Vec<MessageRecord>, StoreError>> {
        let page = match std::mem::replace(&mut self.next, Next::Done) {
            Next::Query => self.store.query_messages(&self.filter).await,
            Next::Continue(token) => self.store.continue_messages(&token).await,
            Next::Done => return None,
        };

        let page = match page {
            Ok(page) => page,
            Err(err) => return Some(Err(err)),
        };
        self.pages += 1;

        if let Some(token) = page.continuation {
            if !self.seen.insert(token.clone()) {
                return Some(Err(StoreError::Data(format!(
                    "continuation token {token} returned twice"
                ))));
            }
            self.next = Next::Continue(token);
        }

        Some(Ok(page.records))
    }

    pub fn pages_read(&self) -> usize {
        self.pages
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.next, Next::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::{cutoff_for, MessagePager};
    use crate::test_support::{message, ScriptedStore};
    use crate::{MessageStore, StoreError};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use recently_core::{ContinuationToken, MessageFilter, MessagePage};
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn cutoff_subtracts_whole_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(
            cutoff_for(now, 14),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn cutoff_saturates_for_huge_windows() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        assert!(cutoff_for(now, u32::MAX) < now);
    }

    #[tokio::test]
    async fn follows_every_page_exactly_once() {
        let records = (0..25)
            .map(|n| message(&format!("m{n}"), &format!("s{n}@x.com"), 1))
            .collect::<Vec<_>>();
        let store = Arc::new(ScriptedStore::new(10, records));
        let pager = MessagePager::new(store.clone());

        let fetched = pager.fetch_window(7).await.expect("window fetched");

        assert_eq!(fetched.len(), 25);
        let ids = fetched.iter().map(|r| r.id.as_str()).collect::<HashSet<_>>();
        assert_eq!(ids.len(), 25);
        assert_eq!(store.query_count(), 1);
        assert_eq!(store.continued_tokens(), vec!["t1".to_string(), "t2".to_string()]);
    }

    #[tokio::test]
    async fn empty_first_page_returns_nothing() {
        let store = Arc::new(ScriptedStore::new(10, Vec::new()));
        let pager = MessagePager::new(store.clone());

        let fetched = pager.fetch_window(14).await.expect("window fetched");
        assert!(fetched.is_empty());
        assert!(store.continued_tokens().is_empty());
    }

    #[tokio::test]
    async fn failed_page_fails_the_fetch() {
        let records = (0..5)
            .map(|n| message(&format!("m{n}"), "a@x.com", 1))
            .collect::<Vec<_>>();
        let store = Arc::new(ScriptedStore::new(2, records));
        store.fail_page(2);
        let pager = MessagePager::new(store.clone());

        let err = pager.fetch_window(7).await.expect_err("fetch must fail");
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn filter_excludes_messages_outside_the_window() {
        let store = Arc::new(ScriptedStore::new(
            10,
            vec![message("new", "a@x.com", 2), message("old", "a@x.com", 20)],
        ));
        let pager = MessagePager::new(store.clone());

        let fetched = pager.fetch_window(14).await.expect("window fetched");
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, "new");

        let filter = store.last_filter().expect("filter recorded");
        let expected = Utc::now() - Duration::days(14);
        assert!((filter.received_after - expected).num_seconds().abs() < 60);
    }

    struct LoopingStore;

    #[async_trait]
    impl MessageStore for LoopingStore {
        async fn query_messages(&self, _: &MessageFilter) -> Result<MessagePage, StoreError> {
            Ok(MessagePage {
                records: vec![message("a", "a@x.com", 1)],
                continuation: Some(ContinuationToken::new("again")),
            })
        }

        async fn continue_messages(
            &self,
            token: &ContinuationToken,
        ) -> Result<MessagePage, StoreError> {
            Ok(MessagePage {
                records: vec![message("b", "b@x.com", 1)],
                continuation: Some(token.clone()),
            })
        }
    }

    #[tokio::test]
    async fn repeated_token_is_rejected() {
        let pager = MessagePager::new(Arc::new(LoopingStore));
        let mut cursor = pager.cursor(Utc::now() - Duration::days(1));

        assert_eq!(cursor.next_page().await.expect("first").expect("ok").len(), 1);
        let err = cursor
            .next_page()
            .await
            .expect("second")
            .expect_err("token reused");
        assert!(matches!(err, StoreError::Data(_)));
        assert!(cursor.is_finished());
        assert!(cursor.next_page().await.is_none());
    }
}
