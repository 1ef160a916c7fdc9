//! Application layer: the indexing and retrieval pipelines
//!
//! Orchestrates domain components and providers into the two core flows:
//! discovery → chunk → embed → upsert, and query → hybrid search →
//! rerank → budget. The `find_code` facade in [`context`] is the surface
//! exposed to external collaborators.

/// The `find_code` facade over indexing and search
pub mod context;
/// Incremental, checkpointed indexing pipeline
pub mod indexer;
/// Hybrid retrieval pipeline
pub mod search;

pub use context::{ContextEngine, ContextServiceInterface};
pub use indexer::{Indexer, RunSummary};
pub use search::SearchPipeline;
