//! Document and news search collaborators
//!
//! Which store backs a run is decided once, at construction:
//! [`select_document_store`] and [`select_news_source`] probe or inspect
//! the configuration and fall back to the in-memory [`KeywordStore`].

pub mod finnhub;
pub mod keyword;
pub mod remote;

pub use finnhub::FinnhubNewsSource;
pub use keyword::KeywordStore;
pub use remote::RemoteDocumentStore;

use crate::error::DataResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    /// Where the text came from: file name, feed or URL
    pub provenance: String,
}

impl RetrievedDocument {
    pub fn new(text: impl Into<String>, provenance: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provenance: provenance.into(),
        }
    }
}

/// Ticker-scoped text search. May return fewer than `limit` hits, or none.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    fn name(&self) -> String;

    async fn search(
        &self,
        ticker: &str,
        query_text: &str,
        limit: usize,
    ) -> DataResult<Vec<RetrievedDocument>>;
}

/// Remote store when `url` is set and answers its health probe, else `fallback`.
pub async fn select_document_store(
    url: Option<String>,
    fallback: Arc<KeywordStore>,
) -> Arc<dyn DocumentSearch> {
    let Some(url) = url else {
        info!("No document store configured, using in-memory keyword store");
        return fallback;
    };

    let store = match RemoteDocumentStore::new(&url) {
        Ok(store) => store,
        Err(e) => {
            warn!(url = %url, error = %e, "Document store misconfigured, using keyword store");
            return fallback;
        }
    };

    if let Err(e) = store.health().await {
        warn!(url = %url, error = %e, "Document store unhealthy, using keyword store");
        return fallback;
    }

    info!(url = %url, "Using remote document store");
    Arc::new(store)
}

/// Finnhub when an API key is available, else `fallback`.
pub fn select_news_source(
    finnhub_api_key: Option<String>,
    fallback: Arc<KeywordStore>,
) -> Arc<dyn DocumentSearch> {
    let Some(key) = finnhub_api_key else {
        info!("No news API key, using in-memory keyword store");
        return fallback;
    };
    info!("Using Finnhub news source");
    Arc::new(FinnhubNewsSource::new(key, finnhub::DEFAULT_RATE_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_select_document_store_without_url() {
        let store = select_document_store(None, Arc::new(KeywordStore::new())).await;
        assert_eq!(store.name(), "keyword");
    }

    #[tokio::test]
    async fn test_select_document_store_unreachable() {
        // port 9 (discard) is not an HTTP server
        let store = select_document_store(
            Some("http://127.0.0.1:9".to_string()),
            Arc::new(KeywordStore::new()),
        )
        .await;
        assert_eq!(store.name(), "keyword");
    }

    #[test]
    fn test_select_news_source() {
        let fallback = Arc::new(KeywordStore::new());
        assert_eq!(select_news_source(None, fallback.clone()).name(), "keyword");
        assert_eq!(
            select_news_source(Some("key".to_string()), fallback).name(),
            "finnhub"
        );
    }
}
