use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::address::{extract_address, normalize_sender};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Lookback applied when no valid setting has been stored.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

/// Metadata snapshot of a single message, as listed by the mail store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub is_junk: bool,
    #[serde(default)]
    pub subject: Option<String>,
}

/// Opaque handle returned by a store while more pages remain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageFilter {
    pub received_after: DateTime<Utc>,
}

/// One page of a listing. `continuation` is `None` on the last page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePage {
    pub records: Vec<MessageRecord>,
    pub continuation: Option<ContinuationToken>,
}

impl MessagePage {
    pub fn last(records: Vec<MessageRecord>) -> Self {
        Self {
            records,
            continuation: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.records.is_empty() && self.continuation.is_none()
    }
}

/// Lower-cased sender address used as the histogram grouping key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NormalizedAddress(String);

impl NormalizedAddress {
    pub fn from_address(address: &str) -> Self {
        Self(address.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistogramEntry {
    /// Distinct raw sender strings seen for this address.
    pub display_names: BTreeSet<String>,
    /// First raw sender string seen for this address.
    pub representative_address: String,
    pub count: usize,
}

impl HistogramEntry {
    fn first_seen(sender: &str) -> Self {
        Self {
            display_names: BTreeSet::from([sender.to_string()]),
            representative_address: sender.to_string(),
            count: 1,
        }
    }

    fn record(&mut self, sender: &str) {
        self.count += 1;
        if !self.display_names.contains(sender) {
            self.display_names.insert(sender.to_string());
        }
    }

    pub fn label(&self) -> &str {
        &self.representative_address
    }

    /// Bare address of the representative sender, suitable for a `mailto:` link.
    pub fn address(&self) -> &str {
        extract_address(&self.representative_address)
            .map(str::trim)
            .unwrap_or(self.representative_address.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Histogram {
    entries: BTreeMap<NormalizedAddress, HistogramEntry>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&HistogramEntry> {
        self.entries.get(&NormalizedAddress::from_address(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NormalizedAddress, &HistogramEntry)> {
        self.entries.iter()
    }

    /// Total number of messages counted across all senders.
    pub fn message_count(&self) -> usize {
        self.entries.values().map(|entry| entry.count).sum()
    }

    /// Entries ordered by count, most frequent first. Ties sort by address.
    pub fn ranked(&self) -> Vec<(&NormalizedAddress, &HistogramEntry)> {
        let mut ranked = self.entries.iter().collect::<Vec<_>>();
        ranked.sort_by(|(left_key, left), (right_key, right)| {
            right
                .count
                .cmp(&left.count)
                .then_with(|| left_key.cmp(right_key))
        });
        ranked
    }

    pub fn top(&self, limit: usize) -> Vec<(&NormalizedAddress, &HistogramEntry)> {
        let mut ranked = self.ranked();
        ranked.truncate(limit);
        ranked
    }
}

/// Folds raw sender strings into a histogram. Senders without an address
/// are skipped.
impl<'a> FromIterator<&'a str> for Histogram {
    fn from_iter<I: IntoIterator<Item = &'a str>>(senders: I) -> Self {
        let mut entries = BTreeMap::new();
        for sender in senders {
            let Some(key) = normalize_sender(sender) else {
                continue;
            };
            match entries.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(HistogramEntry::first_seen(sender));
                }
                Entry::Occupied(mut slot) => slot.get_mut().record(sender),
            }
        }
        Self { entries }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregationConfig {
    pub lookback_days: u32,
}

impl AggregationConfig {
    /// Returns `None` unless `lookback_days` is a positive value that fits a `u32`.
    pub fn new(lookback_days: i64) -> Option<Self> {
        u32::try_from(lookback_days)
            .ok()
            .filter(|days| *days > 0)
            .map(|lookback_days| Self { lookback_days })
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}
