//! Embedding provider interfaces
//!
//! Contracts for providers that turn text into dense or sparse vectors.
//! Every call may suspend for a long time; callers wrap calls with the
//! retry/circuit-breaker layer and a timeout.

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::types::SparseVector;

/// Declared capabilities of an embedding provider
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingCapabilities {
    /// Model identifier
    pub model: String,
    /// Output vector dimensionality
    pub dimensions: usize,
    /// Maximum input size in estimated tokens
    pub max_input_tokens: usize,
    /// Whether the provider can also emit sparse vectors
    pub supports_sparse: bool,
    /// Batch size the provider handles best
    pub preferred_batch: usize,
}

/// Dense embedding provider
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of documents
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a query. Providers that differentiate query and document
    /// embeddings apply their query-side parameters here.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    fn capabilities(&self) -> EmbeddingCapabilities;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Capability probe run at container startup
    async fn health_check(&self) -> Result<()> {
        self.embed_query("health check").await.map(|_| ())
    }

    /// Shutdown hook, called in reverse registration order
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Sparse embedding provider (BM25-family or learned-sparse)
#[async_trait]
pub trait SparseEmbeddingProvider: Send + Sync {
    /// Embed a batch of documents into sparse vectors
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<SparseVector>>;

    /// Embed a query into a sparse vector
    async fn embed_query(&self, text: &str) -> Result<SparseVector>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn health_check(&self) -> Result<()> {
        self.embed_query("health check").await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
