//! Finnhub company news as a headline source

use super::{DocumentSearch, RetrievedDocument};
use crate::error::{DataError, DataResult};
use crate::market::to_yahoo_symbol;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, instrument};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Requests per minute on the free tier
pub const DEFAULT_RATE_LIMIT: u32 = 60;

/// Days of news requested per search
const NEWS_WINDOW_DAYS: i64 = 7;

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Finnhub news article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinnhubNewsArticle {
    #[serde(default)]
    pub category: String,
    /// Publish time (UNIX timestamp)
    #[serde(default)]
    pub datetime: i64,
    pub headline: String,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub related: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: String,
}

/// Company news under a shared rate limit
pub struct FinnhubNewsSource {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: SharedRateLimiter,
}

impl FinnhubNewsSource {
    /// `rate_limit` is requests per minute; zero falls back to the free tier.
    pub fn new(api_key: impl Into<String>, rate_limit: u32) -> Self {
        let per_minute = NonZeroU32::new(rate_limit)
            .or(NonZeroU32::new(DEFAULT_RATE_LIMIT))
            .unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limiter,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Company news for `symbol` between two `YYYY-MM-DD` dates
    pub async fn company_news(
        &self,
        symbol: &str,
        from: &str,
        to: &str,
    ) -> DataResult<Vec<FinnhubNewsArticle>> {
        self.rate_limiter.until_ready().await;

        let url = format!(
            "{}/company-news?symbol={}&from={}&to={}&token={}",
            self.base_url, symbol, from, to, self.api_key
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::provider(
                "finnhub",
                format!("API error {status}: {body}"),
            ));
        }

        Ok(response.json::<Vec<FinnhubNewsArticle>>().await?)
    }
}

/// Newest first, blank headlines dropped, duplicates removed
fn headlines(mut articles: Vec<FinnhubNewsArticle>, limit: usize) -> Vec<RetrievedDocument> {
    articles.sort_by(|a, b| b.datetime.cmp(&a.datetime));
    let mut seen = std::collections::HashSet::new();
    articles
        .into_iter()
        .filter(|a| !a.headline.trim().is_empty())
        .filter(|a| seen.insert(a.headline.trim().to_string()))
        .take(limit)
        .map(|a| {
            let provenance = if a.source.is_empty() {
                "finnhub".to_string()
            } else {
                format!("finnhub:{}", a.source)
            };
            RetrievedDocument::new(a.headline.trim(), provenance)
        })
        .collect()
}

#[async_trait]
impl DocumentSearch for FinnhubNewsSource {
    fn name(&self) -> String {
        "finnhub".to_string()
    }

    #[instrument(skip(self, _query_text))]
    async fn search(
        &self,
        ticker: &str,
        _query_text: &str,
        limit: usize,
    ) -> DataResult<Vec<RetrievedDocument>> {
        let to = Utc::now().date_naive();
        let from = to - Duration::days(NEWS_WINDOW_DAYS);
        let symbol = to_yahoo_symbol(ticker);

        let articles = self
            .company_news(&symbol, &from.to_string(), &to.to_string())
            .await?;
        debug!(symbol = %symbol, articles = articles.len(), "Fetched company news");
        Ok(headlines(articles, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(headline: &str, datetime: i64, source: &str) -> FinnhubNewsArticle {
        FinnhubNewsArticle {
            category: "company".to_string(),
            datetime,
            headline: headline.to_string(),
            id: datetime,
            related: "RELIANCE.NS".to_string(),
            source: source.to_string(),
            summary: String::new(),
            url: String::new(),
        }
    }

    #[test]
    fn test_client_creation() {
        let source = FinnhubNewsSource::new("test_key", 0).with_base_url("http://localhost/");
        assert_eq!(source.api_key, "test_key");
        assert_eq!(source.base_url, "http://localhost");
    }

    #[test]
    fn test_headlines_order_and_dedup() {
        let docs = headlines(
            vec![
                article("older", 1, "Reuters"),
                article("newest", 3, ""),
                article("  ", 4, "Reuters"),
                article("older", 2, "Mint"),
            ],
            5,
        );
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "newest");
        assert_eq!(docs[0].provenance, "finnhub");
        assert_eq!(docs[1].provenance, "finnhub:Mint");
    }

    #[test]
    fn test_article_parsing_tolerates_missing_fields() {
        let parsed: Vec<FinnhubNewsArticle> =
            serde_json::from_str(r#"[{"headline":"Results beat","datetime":1700000000}]"#).unwrap();
        assert_eq!(parsed[0].headline, "Results beat");
        assert!(parsed[0].source.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires network access and FINNHUB_API_KEY
    async fn test_live_search() {
        let key = std::env::var("FINNHUB_API_KEY").unwrap();
        let source = FinnhubNewsSource::new(key, DEFAULT_RATE_LIMIT);
        let docs = source.search("RELIANCE", "", 5).await.unwrap();
        assert!(docs.len() <= 5);
    }
}
