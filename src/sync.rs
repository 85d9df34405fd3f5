use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use uuid::Uuid;

use crate::cache::CollectionCache;
use crate::model::{
    BookCandidate, BookMetadata, BookRecord, HighlightMetadata, NewBook, NewHighlight,
    ParsedHighlight, Submission,
};
use crate::store::{Collection, StoreClient};
use crate::{dates, text};

/// Book creation dates are stamped in UTC-5, matching the offset the store's
/// existing records were written with.
const BOOK_DATE_OFFSET_SECS: i32 = 5 * 3600;

#[derive(Debug, Default)]
pub struct SyncStats {
    pub books_created: u32,
    pub created: u32,
    pub filtered: u32,
}

/// Reconciles parsed submissions against the remote store.
///
/// Submissions are processed strictly one at a time, and highlights within a
/// submission are written strictly one at a time. The single-flight ordering
/// is the rate-limiting policy toward the remote API, and it is what lets
/// the cache be plain unsynchronized state. Any remote failure aborts the
/// rest of the run; already-written records stay behind and are filtered as
/// duplicates on resubmission.
pub struct Synchronizer<'a> {
    store: &'a dyn StoreClient,
    cache: CollectionCache,
    stats: SyncStats,
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a dyn StoreClient) -> Self {
        Synchronizer {
            store,
            cache: CollectionCache::new(),
            stats: SyncStats::default(),
        }
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub async fn synchronize(&mut self, submissions: &[Submission]) -> Result<()> {
        for submission in submissions {
            // Books with zero highlights are never created.
            if submission.highlights.is_empty() {
                tracing::debug!(title = %submission.book.title, "no highlights, skipping");
                continue;
            }

            let book = self.resolve_book(&submission.book).await?;
            let fresh = self.filter_new(&book, submission.highlights.clone()).await?;
            if fresh.is_empty() {
                tracing::info!(title = %book.title, "all highlights already stored");
                continue;
            }

            let count = fresh.len();
            self.write_all(&book, fresh).await?;
            tracing::info!(title = %book.title, created = count, "synchronized highlights");
        }
        Ok(())
    }

    /// Finds the remote book whose `original_title` matches the candidate's
    /// title, or creates one. Matching is on the immutable original title,
    /// never the display title, so upstream title corrections don't fork the
    /// book. When an existing record is found its metadata is authoritative
    /// and the candidate is discarded wholesale.
    async fn resolve_book(&mut self, candidate: &BookCandidate) -> Result<BookRecord> {
        let books = self.cache.books(self.store).await?;
        if let Some(existing) = books
            .iter()
            .find(|b| b.metadata.original_title == candidate.title)
        {
            tracing::debug!(title = %candidate.title, id = %existing.id, "book already exists");
            return Ok(existing.clone());
        }

        let new_book = NewBook {
            title: candidate.title.clone(),
            metadata: BookMetadata {
                original_title: candidate.title.clone(),
                author: candidate.author.clone(),
                asin: candidate.asin.clone(),
                uuid: Uuid::new_v4().to_string(),
                date: creation_date(),
            },
        };
        let created = self
            .store
            .create(Collection::Books, serde_json::to_value(&new_book)?)
            .await?;
        let record: BookRecord =
            serde_json::from_value(created).context("store returned an unreadable book record")?;
        self.cache.record_book(record.clone());
        self.stats.books_created += 1;
        tracing::info!(title = %record.title, id = %record.id, "created book");
        Ok(record)
    }

    /// Drops candidates whose trimmed body already exists among the resolved
    /// book's stored highlights. Dedup is scoped by the resolved record's
    /// uuid — not any locally generated one — and compares exact trimmed
    /// strings. Order is preserved.
    async fn filter_new(
        &mut self,
        book: &BookRecord,
        candidates: Vec<ParsedHighlight>,
    ) -> Result<Vec<ParsedHighlight>> {
        let listing = self.cache.highlights(self.store).await?;
        if listing.is_empty() {
            return Ok(candidates);
        }

        let existing: HashSet<&str> = listing
            .iter()
            .filter(|h| h.metadata.book_uuid == book.metadata.uuid)
            .map(|h| h.body.trim())
            .collect();
        if existing.is_empty() {
            return Ok(candidates);
        }

        let before = candidates.len();
        let fresh: Vec<ParsedHighlight> = candidates
            .into_iter()
            .filter(|c| !existing.contains(c.content.trim()))
            .collect();
        let filtered = before - fresh.len();
        if filtered > 0 {
            self.stats.filtered += filtered as u32;
            tracing::info!(title = %book.title, filtered, "skipped highlights already stored");
        }
        Ok(fresh)
    }

    /// Writes surviving highlights one at a time, in submission order,
    /// appending each created record to the cache before starting the next.
    async fn write_all(&mut self, book: &BookRecord, fresh: Vec<ParsedHighlight>) -> Result<()> {
        for candidate in fresh {
            let new_highlight = build_highlight(book, &candidate);
            let created = self
                .store
                .create(Collection::Highlights, serde_json::to_value(&new_highlight)?)
                .await?;
            let record = serde_json::from_value(created)
                .context("store returned an unreadable highlight record")?;
            self.cache.record_highlight(record);
            self.stats.created += 1;
        }
        Ok(())
    }
}

fn creation_date() -> String {
    let offset = FixedOffset::west_opt(BOOK_DATE_OFFSET_SECS).expect("fixed UTC-5 offset");
    Utc::now().with_timezone(&offset).to_rfc3339()
}

fn build_highlight(book: &BookRecord, candidate: &ParsedHighlight) -> NewHighlight {
    let title = text::highlight_title(&book.title, &candidate.content);
    let path = text::highlight_path(&title);

    let highlighted_on = candidate.date.as_deref().and_then(|raw| {
        let normalized = dates::normalize(raw);
        if normalized.is_none() {
            tracing::warn!(date = raw, title = %book.title, "unparseable highlight date, omitting");
        }
        normalized
    });

    NewHighlight {
        title,
        path,
        body: candidate.content.clone(),
        metadata: HighlightMetadata {
            book_uuid: book.metadata.uuid.clone(),
            comments: candidate.comments.clone(),
            location: candidate.location.clone(),
            source: candidate.source.clone(),
            highlighted_on,
            highlight_by: candidate.user.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory store standing in for the HTTP client. Records call counts
    /// so tests can assert on remote traffic, and can be armed to fail the
    /// create of any record whose body contains a marker string.
    #[derive(Default)]
    struct FakeStore {
        books: Mutex<Vec<Value>>,
        highlights: Mutex<Vec<Value>>,
        book_list_calls: AtomicU32,
        highlight_list_calls: AtomicU32,
        create_calls: AtomicU32,
        next_id: AtomicU32,
        fail_create_containing: Mutex<Option<String>>,
    }

    impl FakeStore {
        fn new() -> Self {
            FakeStore::default()
        }

        fn seed_book(&self, record: Value) {
            self.books.lock().unwrap().push(record);
        }

        fn fail_create_containing(&self, marker: &str) {
            *self.fail_create_containing.lock().unwrap() = Some(marker.to_string());
        }

        fn book_titles(&self) -> Vec<String> {
            self.books
                .lock()
                .unwrap()
                .iter()
                .map(|b| b["title"].as_str().unwrap().to_string())
                .collect()
        }

        fn highlight_bodies(&self) -> Vec<String> {
            self.highlights
                .lock()
                .unwrap()
                .iter()
                .map(|h| h["body"].as_str().unwrap().to_string())
                .collect()
        }

        fn highlight(&self, index: usize) -> Value {
            self.highlights.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl StoreClient for FakeStore {
        async fn list(&self, collection: Collection, _limit: u32) -> Result<Vec<Value>, StoreError> {
            match collection {
                Collection::Books => {
                    self.book_list_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(self.books.lock().unwrap().clone())
                }
                Collection::Highlights => {
                    self.highlight_list_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(self.highlights.lock().unwrap().clone())
                }
            }
        }

        async fn create(&self, collection: Collection, body: Value) -> Result<Value, StoreError> {
            if let Some(marker) = self.fail_create_containing.lock().unwrap().as_deref() {
                if body.to_string().contains(marker) {
                    return Err(StoreError::Status {
                        collection: collection.as_str(),
                        status: 500,
                        body: "injected failure".to_string(),
                    });
                }
            }
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let mut record = body;
            record["id"] = Value::String(format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
            match collection {
                Collection::Books => self.books.lock().unwrap().push(record.clone()),
                Collection::Highlights => self.highlights.lock().unwrap().push(record.clone()),
            }
            Ok(record)
        }
    }

    fn submission(title: &str, contents: &[&str]) -> Submission {
        Submission {
            book: BookCandidate {
                title: title.to_string(),
                author: Some("Jane Doe".to_string()),
                asin: None,
            },
            highlights: contents
                .iter()
                .map(|c| ParsedHighlight {
                    content: c.to_string(),
                    date: None,
                    location: None,
                    comments: None,
                    source: None,
                    user: None,
                })
                .collect(),
        }
    }

    async fn run(store: &FakeStore, submissions: &[Submission]) -> SyncStats {
        let mut sync = Synchronizer::new(store);
        sync.synchronize(submissions).await.unwrap();
        sync.stats
    }

    #[tokio::test]
    async fn resubmission_creates_nothing() {
        let store = FakeStore::new();
        let batch = vec![submission("A Book", &["first quote", "second quote"])];

        let first = run(&store, &batch).await;
        assert_eq!(first.books_created, 1);
        assert_eq!(first.created, 2);
        assert_eq!(
            store.highlight_bodies(),
            vec!["first quote".to_string(), "second quote".to_string()]
        );

        let second = run(&store, &batch).await;
        assert_eq!(second.books_created, 0);
        assert_eq!(second.created, 0);
        assert_eq!(second.filtered, 2);
        assert_eq!(store.book_titles().len(), 1);
        assert_eq!(store.highlight_bodies().len(), 2);
    }

    #[tokio::test]
    async fn dedup_does_not_leak_across_books() {
        let store = FakeStore::new();
        run(&store, &[submission("Foo", &["Same quote."])]).await;
        let stats = run(&store, &[submission("Bar", &["Same quote."])]).await;

        assert_eq!(stats.created, 1);
        assert_eq!(stats.filtered, 0);
        assert_eq!(store.highlight_bodies().len(), 2);
    }

    #[tokio::test]
    async fn dedup_trims_whitespace_but_is_exact() {
        let store = FakeStore::new();
        run(&store, &[submission("A Book", &["  Hello world.  "])]).await;

        let stats = run(
            &store,
            &[submission("A Book", &["Hello world.", "Hello world!"])],
        )
        .await;

        assert_eq!(stats.filtered, 1);
        assert_eq!(stats.created, 1);
        let bodies = store.highlight_bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[1], "Hello world!");
    }

    #[tokio::test]
    async fn resolves_by_original_title_not_display_title() {
        let store = FakeStore::new();
        // Display title was corrected upstream; original_title is the key.
        store.seed_book(json!({
            "id": "b1",
            "title": "Corrected Title",
            "metadata": {
                "original_title": "Raw Export Title",
                "uuid": "book-uuid-1",
                "date": "2020-01-01T00:00:00-05:00"
            }
        }));

        let stats = run(&store, &[submission("Raw Export Title", &["a quote"])]).await;

        assert_eq!(stats.books_created, 0);
        assert_eq!(store.book_titles(), vec!["Corrected Title".to_string()]);
        let created = store.highlight(0);
        assert_eq!(created["metadata"]["book_uuid"], "book-uuid-1");
    }

    #[tokio::test]
    async fn empty_submission_makes_no_remote_calls() {
        let store = FakeStore::new();
        let stats = run(&store, &[submission("A Book", &[])]).await;

        assert_eq!(stats.books_created, 0);
        assert_eq!(store.book_list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.highlight_list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listings_are_fetched_once_per_run() {
        let store = FakeStore::new();
        let batch = vec![
            submission("First Book", &["one"]),
            submission("Second Book", &["two"]),
        ];
        run(&store, &batch).await;

        assert_eq!(store.book_list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.highlight_list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparseable_date_is_omitted_and_write_succeeds() {
        let store = FakeStore::new();
        let mut batch = submission("A Book", &["dated quote", "undated quote"]);
        batch.highlights[0].date = Some("March 3, 2020".to_string());
        batch.highlights[1].date = Some("not a date".to_string());

        let stats = run(&store, &[batch]).await;
        assert_eq!(stats.created, 2);

        let dated = store.highlight(0);
        assert_eq!(dated["metadata"]["highlighted_on"], "2020-03-03T00:00:00Z");
        let undated = store.highlight(1);
        assert!(undated["metadata"].get("highlighted_on").is_none());
    }

    #[tokio::test]
    async fn failure_halts_remaining_submissions() {
        let store = FakeStore::new();
        store.fail_create_containing("doomed quote");
        let batch = vec![
            submission("First Book", &["doomed quote"]),
            submission("Second Book", &["never written"]),
        ];

        let mut sync = Synchronizer::new(&store);
        let result = sync.synchronize(&batch).await;

        assert!(result.is_err());
        // T1's book was created before its highlight failed; T2 never started.
        assert_eq!(store.book_titles(), vec!["First Book".to_string()]);
        assert_eq!(store.highlight_bodies().len(), 0);
    }

    #[tokio::test]
    async fn highlights_are_written_in_submission_order() {
        let store = FakeStore::new();
        run(&store, &[submission("A Book", &["one", "two", "three"])]).await;
        assert_eq!(
            store.highlight_bodies(),
            vec!["one".to_string(), "two".to_string(), "three".to_string()]
        );
    }

    #[test]
    fn built_highlight_derives_title_path_and_metadata() {
        let book = BookRecord {
            id: "b1".to_string(),
            title: "A Book".to_string(),
            metadata: BookMetadata {
                original_title: "A Book".to_string(),
                author: None,
                asin: None,
                uuid: "book-uuid".to_string(),
                date: "2020-01-01T00:00:00-05:00".to_string(),
            },
        };
        let candidate = ParsedHighlight {
            content: " a quote ".to_string(),
            date: None,
            location: Some("120-125".to_string()),
            comments: None,
            source: Some("clippings".to_string()),
            user: Some("reader@example.com".to_string()),
        };

        let built = build_highlight(&book, &candidate);
        assert_eq!(built.title, "A Book - a quote");
        assert!(built.path.starts_with("a-book-a-quote-"));
        assert_eq!(built.body, " a quote ");
        assert_eq!(built.metadata.book_uuid, "book-uuid");
        assert_eq!(built.metadata.location.as_deref(), Some("120-125"));
        assert_eq!(built.metadata.highlight_by.as_deref(), Some("reader@example.com"));
        assert_eq!(built.metadata.highlighted_on, None);
    }
}
