//! Null embedding provider for tests and development
//!
//! Produces deterministic unit-length vectors derived from the input text,
//! so dimension checks, id stability, and similarity plumbing can be
//! exercised without a real model.

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::ports::{EmbeddingCapabilities, EmbeddingProvider};

pub struct NullEmbeddingProvider {
    model: String,
    dimensions: usize,
}

impl NullEmbeddingProvider {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions: dimensions.max(1),
        }
    }

    /// Deterministic pseudo-embedding: blake3 of the text, expanded by
    /// counter-keyed rehashing, normalized to unit length.
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimensions);
        let mut block = 0u64;
        'outer: loop {
            let mut hasher = blake3::Hasher::new();
            hasher.update(text.as_bytes());
            hasher.update(&block.to_le_bytes());
            let digest = hasher.finalize();
            for window in digest.as_bytes().chunks_exact(4) {
                let raw = u32::from_le_bytes([window[0], window[1], window[2], window[3]]);
                // Map to [-1, 1]
                vector.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
                if vector.len() == self.dimensions {
                    break 'outer;
                }
            }
            block += 1;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for NullEmbeddingProvider {
    fn default() -> Self {
        Self::new("null-embedding", 384)
    }
}

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn capabilities(&self) -> EmbeddingCapabilities {
        EmbeddingCapabilities {
            model: self.model.clone(),
            dimensions: self.dimensions,
            max_input_tokens: 8192,
            supports_sparse: false,
            preferred_batch: 32,
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
    async fn vectors_are_deterministic_and_dimension_correct() {
        let provider = NullEmbeddingProvider::new("null-embedding", 64);
        let a = provider.embed_query("parse tokens").await.unwrap();
        let b = provider.embed_query("parse tokens").await.unwrap();
        let c = provider.embed_query("different text").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let provider = NullEmbeddingProvider::default();
        let v = provider.embed_query("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn batch_matches_individual_embeddings() {
        let provider = NullEmbeddingProvider::default();
        let batch = provider
            .embed_documents(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(batch[0], provider.embed_query("one").await.unwrap());
        assert_eq!(batch[1], provider.embed_query("two").await.unwrap());
    }
}
