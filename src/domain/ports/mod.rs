//! Domain port interfaces
//!
//! Boundary contracts between the core and provider implementations. Ports
//! are trait-based so backends can be swapped through the container, and
//! test doubles can stand in for real providers.
//!
//! - **embedding.rs** — dense and sparse embedding providers
//! - **reranking.rs** — optional second-stage rerankers
//! - **vector_store.rs** — vector storage backends

/// Dense and sparse embedding provider interfaces
pub mod embedding;
/// Second-stage reranking interfaces
pub mod reranking;
/// Vector storage backend interfaces
pub mod vector_store;

pub use embedding::{EmbeddingCapabilities, EmbeddingProvider, SparseEmbeddingProvider};
pub use reranking::{RerankingCapabilities, RerankingProvider};
pub use vector_store::{ScoredPoint, VectorStoreCapabilities, VectorStoreProvider};
