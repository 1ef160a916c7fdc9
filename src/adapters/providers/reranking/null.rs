//! Null reranking provider
//!
//! Deterministic lexical-overlap scorer for tests and offline use: the
//! score is the fraction of query terms present in the document.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::ports::{RerankingCapabilities, RerankingProvider};

pub struct NullRerankingProvider {
    model: String,
}

impl NullRerankingProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for NullRerankingProvider {
    fn default() -> Self {
        Self::new("null-rerank")
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl RerankingProvider for NullRerankingProvider {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(usize, f32)> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                let doc_terms = terms(doc);
                let overlap = query_terms.intersection(&doc_terms).count();
                (index, overlap as f32 / query_terms.len() as f32)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_n);
        Ok(scored)
    }

    fn capabilities(&self) -> RerankingCapabilities {
        RerankingCapabilities {
            model: self.model.clone(),
            max_documents: 256,
        }
    }

    fn provider_name(&self) -> &str {
        "null"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overlap_ranks_relevant_documents_first() {
        let reranker = NullRerankingProvider::default();
        let docs = vec![
            "render html template".to_string(),
            "authenticate user token".to_string(),
            "parse authentication token header".to_string(),
        ];
        let ranked = reranker
            .rerank("parse authentication token", &docs, 2)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, 2);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[tokio::test]
    async fn ties_break_by_input_order() {
        let reranker = NullRerankingProvider::default();
        let docs = vec!["token b".to_string(), "token a".to_string()];
        let ranked = reranker.rerank("token", &docs, 2).await.unwrap();
        assert_eq!(ranked[0].0, 0);
        assert_eq!(ranked[1].0, 1);
    }
}
