//! In-memory keyword-scored document store

use super::{DocumentSearch, RetrievedDocument};
use crate::error::DataResult;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Documents kept per ticker; searches never cross tickers.
///
/// A document's score is the fraction of distinct query words it
/// contains. Every document of the ticker is ranked, best first, with
/// insertion order breaking ties.
#[derive(Debug, Default)]
pub struct KeywordStore {
    documents: RwLock<HashMap<String, Vec<RetrievedDocument>>>,
}

impl KeywordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, replacing an existing one with the same text.
    pub async fn upsert(&self, ticker: &str, document: RetrievedDocument) {
        let mut documents = self.documents.write().await;
        let entries = documents.entry(ticker.trim().to_uppercase()).or_default();
        match entries.iter_mut().find(|d| d.text == document.text) {
            Some(existing) => *existing = document,
            None => entries.push(document),
        }
    }

    pub async fn len(&self, ticker: &str) -> usize {
        let documents = self.documents.read().await;
        documents
            .get(&ticker.trim().to_uppercase())
            .map_or(0, Vec::len)
    }
}

fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of `query_words` present in `text`; 1.0 for an empty query
pub(crate) fn keyword_score(query_words: &BTreeSet<String>, text: &str) -> f64 {
    if query_words.is_empty() {
        return 1.0;
    }
    let text_words = words(text);
    let hits = query_words.iter().filter(|w| text_words.contains(*w)).count();
    hits as f64 / query_words.len() as f64
}

#[async_trait]
impl DocumentSearch for KeywordStore {
    fn name(&self) -> String {
        "keyword".to_string()
    }

    async fn search(
        &self,
        ticker: &str,
        query_text: &str,
        limit: usize,
    ) -> DataResult<Vec<RetrievedDocument>> {
        let documents = self.documents.read().await;
        let Some(entries) = documents.get(&ticker.trim().to_uppercase()) else {
            return Ok(Vec::new());
        };

        let query_words = words(query_text);
        let mut scored: Vec<(f64, &RetrievedDocument)> = entries
            .iter()
            .map(|d| (keyword_score(&query_words, &d.text), d))
            .collect();
        // stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, d)| d.clone())
            .collect())
    }
}
