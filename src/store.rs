use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

/// Page-size ceiling for listings. Large enough to fetch every record of a
/// personal highlight library in one read.
pub const LIST_LIMIT: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Books,
    Highlights,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Books => "books",
            Collection::Highlights => "highlights",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to {collection} failed: {source}")]
    Transport {
        collection: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{collection} request returned {status}: {body}")]
    Status {
        collection: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to decode {collection} response: {source}")]
    Decode {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Read/create operations against the remote document-collection API.
///
/// A trait seam so the synchronization engine runs against either the real
/// HTTP client or an in-memory fake in tests. Failures carry no retry
/// semantics; a failed call aborts the current run.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn list(&self, collection: Collection, limit: u32) -> Result<Vec<Value>, StoreError>;
    async fn create(&self, collection: Collection, body: Value) -> Result<Value, StoreError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    records: Vec<Value>,
}

pub struct HttpStoreClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    books_collection: String,
    highlights_collection: String,
}

impl HttpStoreClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.remote.timeout_seconds))
            .build()?;

        Ok(HttpStoreClient {
            client,
            base_url: cfg.remote.url.trim_end_matches('/').to_string(),
            token: cfg.remote.token.clone(),
            books_collection: cfg.collections.books.clone(),
            highlights_collection: cfg.collections.highlights.clone(),
        })
    }

    fn records_url(&self, collection: Collection) -> String {
        let name = match collection {
            Collection::Books => &self.books_collection,
            Collection::Highlights => &self.highlights_collection,
        };
        format!("{}/collections/{}/records", self.base_url, name)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    async fn list(&self, collection: Collection, limit: u32) -> Result<Vec<Value>, StoreError> {
        let request = self
            .authorize(self.client.get(self.records_url(collection)))
            .query(&[("limit", limit)]);

        let response = request.send().await.map_err(|e| StoreError::Transport {
            collection: collection.as_str(),
            source: e,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| StoreError::Transport {
            collection: collection.as_str(),
            source: e,
        })?;
        if !status.is_success() {
            return Err(StoreError::Status {
                collection: collection.as_str(),
                status: status.as_u16(),
                body: text,
            });
        }

        let listing: ListResponse =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode {
                collection: collection.as_str(),
                source: e,
            })?;
        Ok(listing.records)
    }

    async fn create(&self, collection: Collection, body: Value) -> Result<Value, StoreError> {
        let request = self
            .authorize(self.client.post(self.records_url(collection)))
            .json(&body);

        let response = request.send().await.map_err(|e| StoreError::Transport {
            collection: collection.as_str(),
            source: e,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| StoreError::Transport {
            collection: collection.as_str(),
            source: e,
        })?;
        if !status.is_success() {
            return Err(StoreError::Status {
                collection: collection.as_str(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| StoreError::Decode {
            collection: collection.as_str(),
            source: e,
        })
    }
}
