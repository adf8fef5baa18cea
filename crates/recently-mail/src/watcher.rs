use crate::{MaildirStore, RefreshScheduler, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Polls a maildir and forwards arrivals, moves and flag changes to the
/// refresh scheduler.
///
/// The baseline fingerprint is taken before this returns, so changes made
/// afterwards are always reported. The task ends once the scheduler stops.
pub async fn spawn_maildir_watcher(
    store: Arc<MaildirStore>,
    scheduler: RefreshScheduler,
    poll_interval: Duration,
) -> Result<JoinHandle<()>, StoreError> {
    let mut last = store.fingerprint().await?;
    tracing::debug!(
        root = %store.root().display(),
        files = last.files(),
        "watching maildir"
    );

    Ok(tokio::spawn(async move {
        loop {
            sleep(poll_interval).await;
            let current = match store.fingerprint().await {
                Ok(current) => current,
                Err(err) => {
                    tracing::warn!("maildir poll failed: {err}");
                    continue;
                }
            };

            if let Some(event) = current.change_since(&last) {
                tracing::debug!(?event, files = current.files(), "maildir changed");
                if !scheduler.notify(event) {
                    break;
                }
            }
            last = current;
        }
    }))
}
