use recently_core::{normalize_sender, Histogram, MessageRecord};

/// Folds message records into a per-sender [`Histogram`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramBuilder {
    include_junk: bool,
}

impl HistogramBuilder {
    /// Junk-flagged messages are excluded unless [`Self::include_junk`] says otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_junk(mut self, include: bool) -> Self {
        self.include_junk = include;
        self
    }

    pub fn build<'a, I>(&self, records: I) -> Histogram
    where
        I: IntoIterator<Item = &'a MessageRecord>,
    {
        records
            .into_iter()
            .filter(|record| self.include_junk || !record.is_junk)
            .filter(|record| {
                let attributable = normalize_sender(&record.sender).is_some();
                if !attributable {
                    tracing::trace!(id = %record.id, "skipping message without sender address");
                }
                attributable
            })
            .map(|record| record.sender.as_str())
            .collect()
    }
}
