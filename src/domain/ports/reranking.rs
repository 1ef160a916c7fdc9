//! Reranking provider interface

use async_trait::async_trait;

use crate::domain::error::Result;

/// Declared capabilities of a reranking provider
#[derive(Debug, Clone, PartialEq)]
pub struct RerankingCapabilities {
    /// Model identifier
    pub model: String,
    /// Maximum number of documents per rerank call
    pub max_documents: usize,
}

/// Optional second-stage scorer over a shortlist of candidates
#[async_trait]
pub trait RerankingProvider: Send + Sync {
    /// Score `documents` against `query`; returns `(input_index, score)`
    /// pairs for the top `top_n` documents, best first.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>>;

    fn capabilities(&self) -> RerankingCapabilities;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn health_check(&self) -> Result<()> {
        self.rerank("health check", &["probe".to_string()], 1)
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
