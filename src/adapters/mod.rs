//! Adapters layer: provider implementations
//!
//! Concrete implementations of the domain port traits. Each provider is
//! selected by name through the container factories.

/// Embedding, sparse-embedding, reranking, and vector-store providers
pub mod providers;
