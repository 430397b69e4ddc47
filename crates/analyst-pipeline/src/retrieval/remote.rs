//! HTTP client for an external document search service
//!
//! The service exposes `GET /health` and `POST /search` taking
//! `{ticker, query, limit}` and answering `{results: [{text, source}]}`.

use super::{DocumentSearch, RetrievedDocument};
use crate::error::{DataError, DataResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const PROVIDER: &str = "document-store";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    ticker: &'a str,
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    text: String,
    #[serde(default, alias = "source_file", alias = "provenance")]
    source: Option<String>,
}

/// Remote document search over HTTP
#[derive(Debug, Clone)]
pub struct RemoteDocumentStore {
    client: Client,
    base_url: Url,
}

impl RemoteDocumentStore {
    pub fn new(base_url: &str) -> DataResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DataError::provider(PROVIDER, format!("invalid URL {base_url:?}: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> DataResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DataError::provider(PROVIDER, e.to_string()))
    }

    /// Succeeds when the service answers its health endpoint with 2xx
    pub async fn health(&self) -> DataResult<()> {
        let response = self.client.get(self.endpoint("health")?).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(DataError::provider(
                PROVIDER,
                format!("health check returned {}", response.status()),
            ))
        }
    }
}

#[async_trait]
impl DocumentSearch for RemoteDocumentStore {
    fn name(&self) -> String {
        "remote".to_string()
    }

    #[instrument(skip(self, query_text))]
    async fn search(
        &self,
        ticker: &str,
        query_text: &str,
        limit: usize,
    ) -> DataResult<Vec<RetrievedDocument>> {
        let response = self
            .client
            .post(self.endpoint("search")?)
            .json(&SearchRequest {
                ticker,
                query: query_text,
                limit,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::provider(
                PROVIDER,
                format!("search returned {status}: {body}"),
            ));
        }

        let parsed: SearchResponse = response.json().await?;
        debug!(hits = parsed.results.len(), "Document search finished");
        Ok(parsed
            .results
            .into_iter()
            .take(limit)
            .map(|hit| RetrievedDocument {
                text: hit.text,
                provenance: hit.source.unwrap_or_else(|| PROVIDER.to_string()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RemoteDocumentStore::new("not a url").is_err());
    }

    #[test]
    fn test_endpoint_join() {
        let store = RemoteDocumentStore::new("http://localhost:6333/").unwrap();
        assert_eq!(
            store.endpoint("search").unwrap().as_str(),
            "http://localhost:6333/search"
        );
    }

    #[test]
    fn test_response_aliases() {
        let parsed: SearchResponse = serde_json::from_str(
            r#"{"results":[{"text":"a","source_file":"ar.pdf"},{"text":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.results[0].source.as_deref(), Some("ar.pdf"));
        assert!(parsed.results[1].source.is_none());
    }
}
