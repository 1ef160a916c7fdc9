//! BM25 sparse embedder
//!
//! Local sparse vectors with tunable k1/b parameters. Token indices come
//! from the `bm25` crate's hashing tokenizer, so documents and queries from
//! different runs land in the same index space without a fitted vocabulary.
//! Defaults are tuned for code rather than prose: lower k1 (identifiers
//! repeat) and lower b (file length says little about relevance).

use async_trait::async_trait;
use bm25::{Embedder, EmbedderBuilder};

use crate::domain::error::Result;
use crate::domain::ports::SparseEmbeddingProvider;
use crate::domain::types::SparseVector;
use crate::infrastructure::config::SparseEmbeddingSettings;

pub struct Bm25SparseEmbedder {
    embedder: Embedder,
    model: String,
}

impl Bm25SparseEmbedder {
    pub fn new(settings: &SparseEmbeddingSettings) -> Self {
        let embedder = EmbedderBuilder::with_avgdl(settings.avgdl)
            .k1(settings.k1)
            .b(settings.b)
            .build();
        Self {
            embedder,
            model: settings.model.clone(),
        }
    }

    fn embed_text(&self, text: &str) -> SparseVector {
        let embedding = self.embedder.embed(text);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for token in embedding.iter() {
            indices.push(token.index);
            values.push(token.value);
        }
        SparseVector::new(indices, values)
    }
}

impl Default for Bm25SparseEmbedder {
    fn default() -> Self {
        Self::new(&SparseEmbeddingSettings::default())
    }
}

#[async_trait]
impl SparseEmbeddingProvider for Bm25SparseEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<SparseVector> {
        Ok(self.embed_text(text))
    }

    fn provider_name(&self) -> &str {
        "bm25"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let embedder = Bm25SparseEmbedder::default();
        let a = embedder.embed_query("parse authentication token").await.unwrap();
        let b = embedder.embed_query("parse authentication token").await.unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[tokio::test]
    async fn shared_terms_produce_overlap() {
        let embedder = Bm25SparseEmbedder::default();
        let doc = embedder
            .embed_query("fn authenticate(token: &str) -> bool")
            .await
            .unwrap();
        let related = embedder.embed_query("authenticate token").await.unwrap();
        let unrelated = embedder.embed_query("render html template").await.unwrap();
        assert!(doc.dot(&related) > doc.dot(&unrelated));
    }

    #[tokio::test]
    async fn indices_are_sorted_for_dot_products() {
        let embedder = Bm25SparseEmbedder::default();
        let v = embedder
            .embed_query("alpha beta gamma delta epsilon")
            .await
            .unwrap();
        assert!(v.indices.windows(2).all(|w| w[0] <= w[1]));
    }
}
