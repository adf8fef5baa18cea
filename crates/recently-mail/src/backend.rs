use crate::{MailEvent, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mailparse::{parse_headers, MailHeaderMap};
use recently_core::{ContinuationToken, MessageFilter, MessagePage, MessageRecord};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tokio::task;
use uuid::Uuid;

const JUNK_FOLDERS: [&str; 2] = ["junk", "spam"];
/// Maildir delivery area; files there are still being written.
const DELIVERY_DIR: &str = "tmp";

/// Paginated, read-only listing of message metadata.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// First page of every message received strictly after `filter.received_after`.
    async fn query_messages(&self, filter: &MessageFilter) -> Result<MessagePage, StoreError>;

    async fn continue_messages(
        &self,
        token: &ContinuationToken,
    ) -> Result<MessagePage, StoreError>;
}

/// Open listings keyed by continuation token. Tokens are single use.
#[derive(Debug)]
struct Listings {
    page_size: usize,
    open: Mutex<HashMap<ContinuationToken, VecDeque<MessageRecord>>>,
}

impl Listings {
    fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            open: Mutex::new(HashMap::new()),
        }
    }

    fn start(&self, mut records: Vec<MessageRecord>) -> MessagePage {
        records.sort_by(|left, right| right.received_at.cmp(&left.received_at));
        self.page(records.into())
    }

    fn resume(&self, token: &ContinuationToken) -> Result<MessagePage, StoreError> {
        let remaining = self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .ok_or_else(|| StoreError::UnknownToken(token.to_string()))?;
        Ok(self.page(remaining))
    }

    fn page(&self, mut remaining: VecDeque<MessageRecord>) -> MessagePage {
        let take = self.page_size.min(remaining.len());
        let records = remaining.drain(..take).collect::<Vec<_>>();
        if remaining.is_empty() {
            return MessagePage::last(records);
        }

        let token = ContinuationToken::new(Uuid::new_v4().to_string());
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), remaining);
        MessagePage {
            records,
            continuation: Some(token),
        }
    }
}

/// In-process store over a mutable list of records.
#[derive(Debug)]
pub struct MemoryMessageStore {
    records: RwLock<Vec<MessageRecord>>,
    listings: Listings,
}

impl MemoryMessageStore {
    pub fn new(page_size: usize) -> Self {
        Self::with_records(page_size, Vec::new())
    }

    pub fn with_records(page_size: usize, records: Vec<MessageRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            listings: Listings::new(page_size),
        }
    }

    pub fn insert(&self, record: MessageRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn replace(&self, records: Vec<MessageRecord>) {
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = records;
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn query_messages(&self, filter: &MessageFilter) -> Result<MessagePage, StoreError> {
        let matching = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|record| record.received_at > filter.received_after)
            .cloned()
            .collect::<Vec<_>>();
        Ok(self.listings.start(matching))
    }

    async fn continue_messages(
        &self,
        token: &ContinuationToken,
    ) -> Result<MessagePage, StoreError> {
        self.listings.resume(token)
    }
}

/// Change marker for a maildir tree: every message path with its
/// modification time. Moves and flag renames keep the file count but change
/// the paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaildirFingerprint {
    entries: BTreeMap<PathBuf, DateTime<Utc>>,
}

impl MaildirFingerprint {
    pub fn files(&self) -> usize {
        self.entries.len()
    }

    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.entries.values().max().copied()
    }

    /// The event describing how the tree moved from `previous` to `self`.
    pub fn change_since(&self, previous: &Self) -> Option<MailEvent> {
        if self == previous {
            return None;
        }
        let arrived = self
            .entries
            .keys()
            .any(|path| !previous.entries.contains_key(path));
        if self.files() > previous.files() || (arrived && self.newest() > previous.newest()) {
            Some(MailEvent::NewMailArrived)
        } else {
            Some(MailEvent::MessageMetadataChanged)
        }
    }
}

/// Store over a directory tree of RFC 822 message files.
///
/// Files below a `Junk` or `Spam` folder, or carrying `X-Spam-Flag: YES`, are
/// reported as junk. Dot-files are ignored.
#[derive(Debug)]
pub struct MaildirStore {
    root: PathBuf,
    listings: Listings,
}

impl MaildirStore {
    pub fn new(root: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            root: root.into(),
            listings: Listings::new(page_size),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn fingerprint(&self) -> Result<MaildirFingerprint, StoreError> {
        let root = self.root.clone();
        task::spawn_blocking(move || {
            let mut fingerprint = MaildirFingerprint::default();
            for file in collect_files(&root)? {
                // Moved away since the listing; the next poll sees its new path.
                let Ok(modified) = modified_at(&file.path) else {
                    continue;
                };
                let relative = file.path.strip_prefix(&root).unwrap_or(file.path.as_path());
                fingerprint.entries.insert(relative.to_path_buf(), modified);
            }
            Ok(fingerprint)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("maildir scan task failed: {err}")))?
    }
}

#[async_trait]
impl MessageStore for MaildirStore {
    async fn query_messages(&self, filter: &MessageFilter) -> Result<MessagePage, StoreError> {
        let root = self.root.clone();
        let received_after = filter.received_after;

        let records = task::spawn_blocking(move || scan_maildir(&root, received_after))
            .await
            .map_err(|err| StoreError::Unavailable(format!("maildir scan task failed: {err}")))??;

        tracing::debug!(
            root = %self.root.display(),
            records = records.len(),
            "maildir query"
        );
        Ok(self.listings.start(records))
    }

    async fn continue_messages(
        &self,
        token: &ContinuationToken,
    ) -> Result<MessagePage, StoreError> {
        self.listings.resume(token)
    }
}

struct MailFile {
    path: PathBuf,
    in_junk_folder: bool,
}

fn collect_files(root: &Path) -> Result<Vec<MailFile>, StoreError> {
    let mut files = Vec::new();
    collect_files_into(root, false, &mut files)?;
    Ok(files)
}

fn collect_files_into(
    dir: &Path,
    in_junk_folder: bool,
    files: &mut Vec<MailFile>,
) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if name == DELIVERY_DIR {
                continue;
            }
            let junk = in_junk_folder
                || JUNK_FOLDERS
                    .iter()
                    .any(|folder| name.eq_ignore_ascii_case(folder));
            collect_files_into(&entry.path(), junk, files)?;
            continue;
        }

        if file_type.is_file() {
            files.push(MailFile {
                path: entry.path(),
                in_junk_folder,
            });
        }
    }

    Ok(())
}

fn scan_maildir(
    root: &Path,
    received_after: DateTime<Utc>,
) -> Result<Vec<MessageRecord>, StoreError> {
    let files = collect_files(root)?;
    Ok(read_records(root, &files, received_after))
}

fn read_records(
    root: &Path,
    files: &[MailFile],
    received_after: DateTime<Utc>,
) -> Vec<MessageRecord> {
    let mut records = Vec::new();
    for file in files {
        // Clients rename and expunge messages while we scan.
        let raw = match fs::read(&file.path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(path = %file.path.display(), "skipping vanished message: {err}");
                continue;
            }
        };
        let record = match read_record(root, file, &raw) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(path = %file.path.display(), "skipping unreadable message: {err}");
                continue;
            }
        };

        if record.received_at > received_after {
            records.push(record);
        }
    }

    records
}

fn read_record(root: &Path, file: &MailFile, raw: &[u8]) -> Result<MessageRecord, StoreError> {
    let (headers, _) = parse_headers(raw)?;

    let received_at = match headers
        .get_first_value("Date")
        .and_then(|date| mailparse::dateparse(&date).ok())
        .and_then(|timestamp| Utc.timestamp_opt(timestamp, 0).single())
    {
        Some(date) => date,
        None => modified_at(&file.path)?,
    };

    let spam_flagged = headers
        .get_first_value("X-Spam-Flag")
        .is_some_and(|flag| flag.trim().eq_ignore_ascii_case("yes"));

    let id = headers.get_first_value("Message-ID").unwrap_or_else(|| {
        file.path
            .strip_prefix(root)
            .unwrap_or(file.path.as_path())
            .to_string_lossy()
            .into_owned()
    });

    Ok(MessageRecord {
        id,
        sender: headers
            .get_first_value("From")
            .map(|from| from.trim().to_string())
            .unwrap_or_default(),
        received_at,
        is_junk: file.in_junk_folder || spam_flagged,
        subject: headers.get_first_value("Subject"),
    })
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::<Utc>::from(fs::metadata(path)?.modified()?))
}
