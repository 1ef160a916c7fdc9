//! Provider implementations
//!
//! | Capability | Providers |
//! |-----------|-----------|
//! | Dense embedding | `openai-compatible` (HTTP), `null` (deterministic, tests) |
//! | Sparse embedding | `bm25` (local) |
//! | Reranking | `openai-compatible` (HTTP), `null` (lexical overlap) |
//! | Vector store | `in-memory`, `filesystem` |

pub mod embedding;
pub mod reranking;
pub mod sparse;
pub mod vector_store;
