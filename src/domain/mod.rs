//! Domain layer: the language-independent core model
//!
//! Everything here is free of IO and provider specifics: spans, chunks,
//! the grammar registry, the chunker, the filter DSL, and the port traits
//! implemented by adapters.

/// Language-aware chunking strategies and the chunk governor
pub mod chunking;
/// Closed error-kind set
pub mod error;
/// Vendor-neutral filter DSL
pub mod filter;
/// AST node classification and importance weighting
pub mod grammar;
/// Boundary contracts for providers
pub mod ports;
/// Immutable source location descriptors
pub mod span;
/// Core entities: chunks, vector points, queries, results
pub mod types;

pub use error::{Error, Result};
pub use filter::Filter;
pub use span::{Span, SpanGroup};
