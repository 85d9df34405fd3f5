use anyhow::{Context, Result};

use crate::model::{BookRecord, HighlightRecord};
use crate::store::{Collection, LIST_LIMIT, StoreClient};

/// Per-run mirror of the remote collections.
///
/// Each listing is fetched at most once per process lifetime and appended to
/// whenever a local create succeeds. There is no refresh: the run is assumed
/// to be the only writer of these collections while it executes, so the
/// memoized listing plus local appends is the truth for the whole run.
#[derive(Debug, Default)]
pub struct CollectionCache {
    books: Option<Vec<BookRecord>>,
    highlights: Option<Vec<HighlightRecord>>,
}

impl CollectionCache {
    pub fn new() -> Self {
        CollectionCache::default()
    }

    pub async fn books(&mut self, store: &dyn StoreClient) -> Result<&[BookRecord]> {
        if self.books.is_none() {
            let raw = store.list(Collection::Books, LIST_LIMIT).await?;
            let records = raw
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<BookRecord>, _>>()
                .context("book listing contained an unreadable record")?;
            tracing::debug!(count = records.len(), "fetched book listing");
            self.books = Some(records);
        }
        Ok(self.books.as_deref().unwrap_or_default())
    }

    pub async fn highlights(&mut self, store: &dyn StoreClient) -> Result<&[HighlightRecord]> {
        if self.highlights.is_none() {
            let raw = store.list(Collection::Highlights, LIST_LIMIT).await?;
            let records = raw
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<HighlightRecord>, _>>()
                .context("highlight listing contained an unreadable record")?;
            tracing::debug!(count = records.len(), "fetched highlight listing");
            self.highlights = Some(records);
        }
        Ok(self.highlights.as_deref().unwrap_or_default())
    }

    pub fn record_book(&mut self, record: BookRecord) {
        self.books.get_or_insert_with(Vec::new).push(record);
    }

    pub fn record_highlight(&mut self, record: HighlightRecord) {
        self.highlights.get_or_insert_with(Vec::new).push(record);
    }
}
