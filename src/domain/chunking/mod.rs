//! Language-aware code chunking
//!
//! Breaks source files into span-accurate fragments for embedding and
//! retrieval. Two strategies are dispatched by language capability:
//!
//! 1. **AST-semantic** — languages with a compiled tree-sitter grammar are
//!    parsed and chunked at definition boundaries, with semantic metadata
//!    attached from the grammar registry.
//! 2. **Delimiter-heuristic** — languages without a grammar but with a
//!    delimiter-family mapping are segmented by block delimiters (braces,
//!    indentation, `end` keywords, headings).
//!
//! A language with neither a grammar nor a family mapping is **not
//! indexed**; falling back to blind line-based chunking would pollute the
//! retrieval corpus with noise.
//!
//! Chunking is deterministic: identical `(content, language, settings)`
//! produce byte-identical chunks, including ids. The [`ChunkGovernor`]
//! enforces the per-chunk size envelope before chunks are materialized.

pub mod ast;
pub mod delimiter;
pub mod governor;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::error::{Error, Result};
use crate::domain::grammar::GrammarRegistry;
use crate::domain::span::Span;
use crate::domain::types::{Chunk, ChunkKind, Language, SemanticMetadata};

pub use delimiter::DelimiterFamily;
pub use governor::ChunkGovernor;

/// Which strategy to use for chunking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// AST when a grammar exists, delimiter family otherwise
    #[default]
    Auto,
    /// Force AST chunking (delimiter fallback still applies on parse failure)
    Ast,
    /// Force delimiter chunking even for grammar-backed languages
    Delimiter,
}

/// Chunker settings; see the `chunker` configuration section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkerConfig {
    /// Strategy dispatch mode
    pub strategy: ChunkStrategy,
    /// Minimum lines per chunk; smaller chunks are coalesced or dropped
    pub min_lines: u32,
    /// Maximum estimated tokens per chunk, bounded by the embedding model
    pub max_tokens: usize,
    /// Overlap carried across governor splits, in estimated tokens
    pub overlap_tokens: usize,
    /// Index languages without a grammar or family mapping using the
    /// C-style delimiter family as a last resort
    pub index_unmapped: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Auto,
            min_lines: 3,
            max_tokens: 512,
            overlap_tokens: 32,
            index_unmapped: false,
        }
    }
}

/// A chunk before span/id materialization: a byte range with classification.
///
/// The governor operates on drafts so splits and coalescing happen before
/// ids are assigned, keeping ids a pure function of the final ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftChunk {
    pub byte_start: usize,
    pub byte_end: usize,
    pub kind: ChunkKind,
    pub semantic: Option<SemanticMetadata>,
}

impl DraftChunk {
    pub fn len(&self) -> usize {
        self.byte_end - self.byte_start
    }

    pub fn is_empty(&self) -> bool {
        self.byte_start == self.byte_end
    }

    /// Line count of the draft's slice of `content`
    pub fn line_count(&self, content: &str) -> usize {
        content[self.byte_start..self.byte_end].lines().count()
    }

    /// Whether the draft carries semantics worth keeping even when tiny
    pub fn is_high_importance(&self) -> bool {
        matches!(
            self.kind,
            ChunkKind::Function | ChunkKind::Method | ChunkKind::Type
        ) || self
            .semantic
            .as_ref()
            .is_some_and(|s| s.importance >= 0.5)
    }
}

/// Produces chunks from a file; the single entry point of this module
pub struct Chunker {
    registry: Arc<GrammarRegistry>,
    config: ChunkerConfig,
    governor: ChunkGovernor,
}

impl Chunker {
    pub fn new(registry: Arc<GrammarRegistry>, config: ChunkerConfig) -> Self {
        let governor = ChunkGovernor::new(
            config.min_lines,
            config.max_tokens,
            config.overlap_tokens,
        );
        Self {
            registry,
            config,
            governor,
        }
    }

    /// Chunker with default settings, mainly for tests
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(GrammarRegistry::builtin()), ChunkerConfig::default())
    }

    /// Chunk one file. Single-threaded per file; callers may run many files
    /// in parallel.
    ///
    /// Fails with [`Error::Validation`] when the language cannot be chunked
    /// at all (no grammar, no family mapping, `index_unmapped` off); the
    /// caller records the file as skipped without aborting the batch.
    pub fn chunk(&self, file_path: &Path, content: &str, language: Language) -> Result<Vec<Chunk>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let drafts = self.drafts_for(file_path, content, language)?;
        let drafts = self.governor.enforce(drafts, content);

        let mut chunks = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let span = Span::new(file_path, draft.byte_start, draft.byte_end, content)?;
            let text = content[draft.byte_start..draft.byte_end].to_string();
            chunks.push(Chunk::new(span, text, language, draft.kind, draft.semantic));
        }
        Ok(chunks)
    }

    fn drafts_for(
        &self,
        file_path: &Path,
        content: &str,
        language: Language,
    ) -> Result<Vec<DraftChunk>> {
        let use_ast = match self.config.strategy {
            ChunkStrategy::Auto | ChunkStrategy::Ast => language.has_grammar(),
            ChunkStrategy::Delimiter => false,
        };

        if use_ast {
            match ast::chunk_ast(content, language, &self.registry) {
                Ok(drafts) if !drafts.is_empty() => return Ok(drafts),
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(
                        file = %file_path.display(),
                        %err,
                        "AST chunking failed, falling back to delimiter strategy"
                    );
                }
            }
        }

        let family = DelimiterFamily::for_language(language).or(if self.config.index_unmapped {
            Some(DelimiterFamily::CStyle)
        } else {
            None
        });

        match family {
            Some(family) => delimiter::chunk_with_family(content, family),
            None => Err(Error::validation(format!(
                "language '{language}' has no grammar and no delimiter family mapping; file not indexed"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn python_function_is_one_definition_chunk() {
        let chunker = Chunker::with_defaults();
        let content = "def foo():\n    return 1\n";
        let chunks = chunker
            .chunk(&PathBuf::from("a.py"), content, Language::Python)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.kind, ChunkKind::Function);
        assert_eq!(chunk.span.line_start, 1);
        assert_eq!(chunk.span.line_end, 2);
        let semantic = chunk.semantic.as_ref().expect("AST metadata");
        assert_eq!(
            semantic.category,
            crate::domain::types::SemanticCategory::Definition
        );
        // Exact-substring invariant
        assert_eq!(
            chunk.content,
            &content[chunk.span.byte_start..chunk.span.byte_end]
        );
    }

    #[test]
    fn unmapped_language_is_not_indexed() {
        let chunker = Chunker::with_defaults();
        let err = chunker
            .chunk(&PathBuf::from("b.txt"), "hello", Language::PlainText)
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn unmapped_language_opt_in_uses_cstyle_family() {
        let config = ChunkerConfig {
            index_unmapped: true,
            ..ChunkerConfig::default()
        };
        let chunker = Chunker::new(Arc::new(GrammarRegistry::builtin()), config);
        let content = "widget make_widget(int size) {\n    widget w;\n    w.size = size;\n    return w;\n}\n";
        let chunks = chunker
            .chunk(&PathBuf::from("w.zap"), content, Language::Unknown)
            .unwrap();
        assert!(!chunks.is_empty());
    }

    #[test]
    fn empty_file_yields_zero_chunks() {
        let chunker = Chunker::with_defaults();
        let chunks = chunker
            .chunk(&PathBuf::from("e.rs"), "", Language::Rust)
            .unwrap();
        assert!(chunks.is_empty());
        let blank = chunker
            .chunk(&PathBuf::from("e.rs"), "   \n\n", Language::Rust)
            .unwrap();
        assert!(blank.is_empty());
    }

    #[test]
    fn chunking_is_deterministic_including_ids() {
        let chunker = Chunker::with_defaults();
        let content = "fn a() -> u32 {\n    1\n}\n\nfn b() -> u32 {\n    2\n}\n";
        let first = chunker
            .chunk(&PathBuf::from("src/lib.rs"), content, Language::Rust)
            .unwrap();
        let second = chunker
            .chunk(&PathBuf::from("src/lib.rs"), content, Language::Rust)
            .unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.span, b.span);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn swift_uses_delimiter_family() {
        let chunker = Chunker::with_defaults();
        let content = "func greet(name: String) -> String {\n    let message = \"hi \" + name\n    return message\n}\n";
        let chunks = chunker
            .chunk(&PathBuf::from("a.swift"), content, Language::Swift)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Function);
        assert!(chunks[0].semantic.is_none());
    }
}
