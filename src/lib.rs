//! codescout - semantic code search core
//!
//! Transforms a source repository into a searchable corpus of precisely
//! bounded code fragments, keeps that corpus coherent with the filesystem
//! as it changes, and answers natural-language queries with ranked
//! fragments carrying exact file/line provenance.
//!
//! The crate is organized hexagonally:
//!
//! - [`domain`] — spans, chunks, grammar registry, chunker, filter DSL,
//!   and the port traits providers implement
//! - [`application`] — the indexing pipeline and the hybrid retrieval
//!   pipeline, plus the `find_code` facade
//! - [`adapters`] — provider implementations (embedding, sparse, rerank,
//!   vector store)
//! - [`infrastructure`] — configuration, resilience, manifest/checkpoint
//!   persistence, the filesystem watcher, and the DI container

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export core types for the public API
pub use domain::error::{Error, Result};
pub use domain::types::*;

// Re-export main entry points
pub use application::context::ContextEngine;
pub use infrastructure::config::Settings;
pub use infrastructure::di::ProviderContainer;
