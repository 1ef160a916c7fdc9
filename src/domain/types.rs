//! Core domain model for the semantic code-search engine
//!
//! Defines the entities that flow through the indexing and retrieval
//! pipelines: code chunks with exact provenance, the vector points they
//! become, the collection metadata that guards provider compatibility, and
//! the query/result types handed to callers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Chunk`] | Immutable code fragment with span, content hash, and id |
//! | [`Language`] | Supported languages, grammar-backed or family-mapped |
//! | [`VectorPoint`] | Dense/sparse vectors plus payload for the store |
//! | [`CollectionMetadata`] | Per-collection provider and dimension record |
//! | [`SearchQuery`] / [`CodeMatch`] | Retrieval request and ranked result |

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::error::{Error, Result};
use crate::domain::filter::Filter;
use crate::domain::span::Span;

/// Rough token count for a piece of text: `ceil(bytes / 4)`.
///
/// Monotone in content length and reproducible across runs; retrieval
/// budgeting and the chunk governor both rely on those two properties.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4).max(1)
}

// =============================================================================
// Languages
// =============================================================================

/// Supported languages.
///
/// Grammar-backed variants are chunked with tree-sitter; the rest are served
/// by a delimiter family (see the chunker) or not indexed at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    CSharp,
    Php,
    Swift,
    Kotlin,
    Scala,
    Haskell,
    OCaml,
    Elixir,
    Lua,
    Shell,
    Matlab,
    Latex,
    Markdown,
    Html,
    PlainText,
    Unknown,
}

impl Language {
    /// Map a file extension (without dot) to a language
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" | "rake" => Language::Ruby,
            "cs" => Language::CSharp,
            "php" => Language::Php,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            "scala" | "sc" => Language::Scala,
            "hs" | "lhs" => Language::Haskell,
            "ml" | "mli" => Language::OCaml,
            "ex" | "exs" => Language::Elixir,
            "lua" => Language::Lua,
            "sh" | "bash" | "zsh" | "fish" => Language::Shell,
            "m" => Language::Matlab,
            "tex" | "sty" => Language::Latex,
            "md" | "markdown" => Language::Markdown,
            "html" | "htm" => Language::Html,
            "txt" | "text" => Language::PlainText,
            _ => Language::Unknown,
        }
    }

    /// Whether a tree-sitter grammar is compiled in for this language
    pub fn has_grammar(&self) -> bool {
        matches!(
            self,
            Language::Rust
                | Language::Python
                | Language::JavaScript
                | Language::TypeScript
                | Language::Go
                | Language::Java
                | Language::C
                | Language::Cpp
                | Language::Ruby
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::CSharp => "csharp",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::Haskell => "haskell",
            Language::OCaml => "ocaml",
            Language::Elixir => "elixir",
            Language::Lua => "lua",
            Language::Shell => "shell",
            Language::Matlab => "matlab",
            Language::Latex => "latex",
            Language::Markdown => "markdown",
            Language::Html => "html",
            Language::PlainText => "plaintext",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lang = match s.to_lowercase().as_str() {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "ruby" => Language::Ruby,
            "csharp" | "c#" => Language::CSharp,
            "php" => Language::Php,
            "swift" => Language::Swift,
            "kotlin" => Language::Kotlin,
            "scala" => Language::Scala,
            "haskell" => Language::Haskell,
            "ocaml" => Language::OCaml,
            "elixir" => Language::Elixir,
            "lua" => Language::Lua,
            "shell" | "bash" => Language::Shell,
            "matlab" => Language::Matlab,
            "latex" => Language::Latex,
            "markdown" => Language::Markdown,
            "html" => Language::Html,
            "plaintext" | "text" => Language::PlainText,
            other => return Err(Error::validation(format!("unknown language: {other}"))),
        };
        Ok(lang)
    }
}

// =============================================================================
// Chunks
// =============================================================================

/// Coarse classification of what a chunk is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    /// Class, struct, enum, trait, interface, type alias
    Type,
    Method,
    Block,
    Comment,
    Import,
    /// Leading imports/docstring block at the top of a file
    ModulePrelude,
    Unknown,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Type => "type",
            ChunkKind::Method => "method",
            ChunkKind::Block => "block",
            ChunkKind::Comment => "comment",
            ChunkKind::Import => "import",
            ChunkKind::ModulePrelude => "module_prelude",
            ChunkKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Semantic role of an AST node, assigned by the grammar registry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SemanticCategory {
    Definition,
    Declaration,
    Invocation,
    ControlFlow,
    Literal,
    Import,
    Comment,
    Module,
    Unknown,
}

impl SemanticCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticCategory::Definition => "definition",
            SemanticCategory::Declaration => "declaration",
            SemanticCategory::Invocation => "invocation",
            SemanticCategory::ControlFlow => "control_flow",
            SemanticCategory::Literal => "literal",
            SemanticCategory::Import => "import",
            SemanticCategory::Comment => "comment",
            SemanticCategory::Module => "module",
            SemanticCategory::Unknown => "unknown",
        }
    }
}

/// Plain-data description of the AST node a chunk came from.
///
/// Holds no parser handles; the AST is collapsed to this at chunk time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticMetadata {
    /// Grammar node type, e.g. `function_item`
    pub node_type: String,
    /// Semantic role assigned by the grammar registry
    pub category: SemanticCategory,
    /// Combined importance weight in `[0, 1]`
    pub importance: f32,
    /// Identifiers referenced inside the node
    pub references: Vec<String>,
}

/// Immutable code fragment with exact provenance.
///
/// The id is content-addressed: identical content at the same location
/// yields the same id across runs and hosts. Equality covers the identity
/// fields; `created_at` is bookkeeping and excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id derived from content hash, path, and byte offset
    pub id: Uuid,
    /// Location of the fragment in its file
    pub span: Span,
    /// The fragment text; always `file[span.byte_start..span.byte_end]`
    pub content: String,
    /// Language the fragment was parsed as
    pub language: Language,
    /// Coarse fragment classification
    pub kind: ChunkKind,
    /// AST-derived metadata, present for AST-chunked fragments
    pub semantic: Option<SemanticMetadata>,
    /// Blake3 hash of `content`, hex-encoded
    pub content_hash: String,
    /// When the chunk was produced
    pub created_at: DateTime<Utc>,
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.span == other.span
            && self.content == other.content
            && self.language == other.language
            && self.kind == other.kind
            && self.semantic == other.semantic
            && self.content_hash == other.content_hash
    }
}

impl Chunk {
    /// Build a chunk, computing its content hash and deterministic id
    pub fn new(
        span: Span,
        content: String,
        language: Language,
        kind: ChunkKind,
        semantic: Option<SemanticMetadata>,
    ) -> Self {
        let hash = blake3::hash(content.as_bytes());
        let id = deterministic_chunk_id(&hash, &span.file_path, span.byte_start);
        Self {
            id,
            span,
            content,
            language,
            kind,
            semantic,
            content_hash: hash.to_hex().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Token estimate for the fragment, computed on demand
    pub fn token_estimate(&self) -> usize {
        estimate_tokens(&self.content)
    }

    /// Number of lines the fragment spans
    pub fn line_count(&self) -> u32 {
        self.span.line_end - self.span.line_start + 1
    }

    /// Stable `file:line` name used for payload-based deletion
    pub fn chunk_name(&self) -> String {
        format!("{}:{}", self.span.file_path.display(), self.span.line_start)
    }

    /// Flat projection used as the embedding text payload and as part of
    /// the vector-store payload.
    ///
    /// Every value is materialized from plain fields; no computed accessor
    /// re-enters the chunk graph during serialization.
    pub fn serialize_for_embedding(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".to_string(), Value::String(self.id.to_string()));
        map.insert(
            "file".to_string(),
            Value::String(self.span.file_path.display().to_string()),
        );
        map.insert(
            "language".to_string(),
            Value::String(self.language.as_str().to_string()),
        );
        map.insert(
            "kind".to_string(),
            Value::String(self.kind.as_str().to_string()),
        );
        map.insert("line_start".to_string(), Value::from(self.span.line_start));
        map.insert("line_end".to_string(), Value::from(self.span.line_end));
        map.insert("content".to_string(), Value::String(self.content.clone()));
        map
    }

    /// Text handed to embedding providers: the flat projection, serialized
    pub fn embedding_text(&self) -> String {
        Value::Object(self.serialize_for_embedding()).to_string()
    }
}

/// Derive a chunk id from `blake3(content_hash ‖ path ‖ byte_start_le)`.
///
/// Emitted through the UUID v8 (custom) format so the result is a valid
/// RFC 4122 UUID while staying stable across runs, hosts, and orderings.
pub fn deterministic_chunk_id(
    content_hash: &blake3::Hash,
    file_path: &std::path::Path,
    byte_start: usize,
) -> Uuid {
    let mut hasher = blake3::Hasher::new();
    hasher.update(content_hash.as_bytes());
    hasher.update(file_path.to_string_lossy().as_bytes());
    hasher.update(&(byte_start as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    Uuid::new_v8(bytes)
}

// =============================================================================
// Discovery
// =============================================================================

/// A file found during project discovery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredFile {
    /// Path relative to the project root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last-modified time (Unix epoch seconds), when available
    pub mtime: Option<u64>,
    /// Language detected from the file extension
    pub language: Language,
    /// Whether ignore rules excluded the file
    pub ignored: bool,
}

// =============================================================================
// Vector store types
// =============================================================================

/// Sparse vector as parallel index/value lists, sorted by index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Build a sparse vector, sorting entries by index
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        let mut pairs: Vec<(u32, f32)> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|(i, _)| *i);
        Self {
            indices: pairs.iter().map(|(i, _)| *i).collect(),
            values: pairs.iter().map(|(_, v)| *v).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Dot product over the shared indices of two sorted sparse vectors
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0usize, 0usize);
        let mut sum = 0.0f32;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Well-known payload keys stored with every vector point
pub mod payload {
    pub const FILE_PATH: &str = "file_path";
    pub const LANGUAGE: &str = "language";
    pub const LINE_START: &str = "line_start";
    pub const LINE_END: &str = "line_end";
    pub const CHUNK_KIND: &str = "chunk_kind";
    pub const CONTENT_HASH: &str = "content_hash";
    pub const EMBEDDING_COMPLETE: &str = "embedding_complete";
    pub const INDEXED_AT: &str = "indexed_at";
    pub const PROVIDER_NAME: &str = "provider_name";
    pub const SEMANTIC_CATEGORY: &str = "semantic_category";
    pub const IMPORTANCE: &str = "importance";
    pub const CHUNK_NAME: &str = "chunk_name";

    /// Fields the filter DSL may reference
    pub const KNOWN_FIELDS: &[&str] = &[
        FILE_PATH,
        LANGUAGE,
        LINE_START,
        LINE_END,
        CHUNK_KIND,
        CONTENT_HASH,
        EMBEDDING_COMPLETE,
        INDEXED_AT,
        PROVIDER_NAME,
        SEMANTIC_CATEGORY,
        IMPORTANCE,
        CHUNK_NAME,
    ];
}

/// A point in the vector store: named vectors plus payload.
///
/// At least one of `dense`/`sparse` must be present. A point missing one
/// expected vector carries `embedding_complete = false` in its payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    /// Shares the chunk's id
    pub id: Uuid,
    /// Dense vector, cosine distance
    pub dense: Option<Vec<f32>>,
    /// Sparse vector, dot-product scored
    pub sparse: Option<SparseVector>,
    /// Flat payload; keys from [`payload`]
    pub payload: Map<String, Value>,
}

impl VectorPoint {
    /// Check the one-vector-present invariant
    pub fn validate(&self) -> Result<()> {
        if self.dense.is_none() && self.sparse.as_ref().is_none_or(|s| s.is_empty()) {
            return Err(Error::validation(format!(
                "vector point {} carries neither a dense nor a sparse vector",
                self.id
            )));
        }
        Ok(())
    }

    /// Payload accessor for the file path
    pub fn file_path(&self) -> Option<&str> {
        self.payload.get(payload::FILE_PATH).and_then(Value::as_str)
    }
}

/// Fixed id of the per-collection metadata record
pub const METADATA_POINT_ID: Uuid = Uuid::nil();

/// Current collection schema version
pub const COLLECTION_SCHEMA_VERSION: u32 = 1;

/// Written once when a collection is created; compared on every reopen.
///
/// A `provider_name` mismatch raises [`Error::ProviderSwitch`]; a
/// `dense_dim` mismatch raises [`Error::DimensionMismatch`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionMetadata {
    /// Embedding provider the collection was built with
    pub provider_name: String,
    /// Dense model identifier
    pub model_name: String,
    /// Collection schema version
    pub schema_version: u32,
    /// When the collection was created
    pub created_at: DateTime<Utc>,
    /// Declared dense vector dimensionality
    pub dense_dim: usize,
    /// Whether sparse vectors are stored
    pub sparse_present: bool,
    /// Project the collection indexes
    pub project_name: String,
}

// =============================================================================
// Queries and results
// =============================================================================

/// Why the caller is searching; influences ranking weights only
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Discovery,
    Debugging,
    Modification,
    Documentation,
    Comprehension,
}

impl std::str::FromStr for QueryIntent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "discovery" => Ok(QueryIntent::Discovery),
            "debugging" => Ok(QueryIntent::Debugging),
            "modification" => Ok(QueryIntent::Modification),
            "documentation" => Ok(QueryIntent::Documentation),
            "comprehension" => Ok(QueryIntent::Comprehension),
            other => Err(Error::validation(format!("unknown intent: {other}"))),
        }
    }
}

/// A retrieval request
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Natural-language query text
    pub text: String,
    /// Ranking hint; never changes the search space
    pub intent: Option<QueryIntent>,
    /// Vendor-neutral payload predicate
    pub filter: Option<Filter>,
    /// Result budget in estimated tokens
    pub token_budget: usize,
    /// Restrict results to these languages
    pub focus_languages: Option<Vec<Language>>,
    /// Dense/sparse fusion weight for this request; `None` uses the default
    pub alpha: Option<f32>,
}

impl SearchQuery {
    /// A query with the default token budget and no hints
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            intent: None,
            filter: None,
            token_budget: 8_000,
            focus_languages: None,
            alpha: None,
        }
    }
}

/// Which searches produced a match
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Hybrid,
    DenseOnly,
    SparseOnly,
}

/// Component scores carried on every match for transparency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ComponentScores {
    pub dense: Option<f32>,
    pub sparse: Option<f32>,
    pub rerank: Option<f32>,
    pub combined: f32,
}

/// A ranked result with exact provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeMatch {
    /// Id of the matched chunk
    pub chunk_id: Uuid,
    /// Path relative to the project root
    pub file_path: String,
    /// 1-based first line of the fragment
    pub line_start: u32,
    /// 1-based last line of the fragment
    pub line_end: u32,
    /// Fragment text, read from the live file
    pub content: String,
    /// All component scores
    pub scores: ComponentScores,
    /// Which searches produced the match
    pub match_kind: MatchKind,
    /// Symbols referenced near the match
    pub related_symbols: Vec<String>,
    /// Language of the fragment
    pub language: Option<Language>,
    /// Content hash recorded at index time
    pub content_hash: String,
}

/// Response of the `find_code` facade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindCodeResponse {
    /// Ranked matches within the token budget
    pub matches: Vec<CodeMatch>,
    /// One-line description of what was searched and found
    pub summary: String,
    /// Non-fatal degradations, e.g. `sparse_only_fallback`
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_deterministic() {
        let content = "def foo():\n    return 1\n";
        let span = Span::new("a.py", 0, content.len(), content).unwrap();
        let a = Chunk::new(
            span.clone(),
            content.to_string(),
            Language::Python,
            ChunkKind::Function,
            None,
        );
        let b = Chunk::new(
            span,
            content.to_string(),
            Language::Python,
            ChunkKind::Function,
            None,
        );
        assert_eq!(a.id, b.id);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn chunk_ids_differ_by_location() {
        let content = "x = 1\nx = 1\n";
        let first = Span::new("a.py", 0, 6, content).unwrap();
        let second = Span::new("a.py", 6, 12, content).unwrap();
        let a = Chunk::new(
            first,
            "x = 1\n".to_string(),
            Language::Python,
            ChunkKind::Block,
            None,
        );
        let b = Chunk::new(
            second,
            "x = 1\n".to_string(),
            Language::Python,
            ChunkKind::Block,
            None,
        );
        // Same content, same file, different offset
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn serialize_for_embedding_is_flat() {
        let content = "fn main() {}\n";
        let span = Span::new("src/main.rs", 0, content.len(), content).unwrap();
        let chunk = Chunk::new(
            span,
            content.to_string(),
            Language::Rust,
            ChunkKind::Function,
            None,
        );
        let map = chunk.serialize_for_embedding();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "id",
                "file",
                "language",
                "kind",
                "line_start",
                "line_end",
                "content"
            ]
        );
        // Flat values only, nothing nested
        assert!(map.values().all(|v| !v.is_object() && !v.is_array()));
    }

    #[test]
    fn token_estimate_is_monotone() {
        assert!(estimate_tokens("abcd") <= estimate_tokens("abcdefgh"));
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn sparse_dot_matches_shared_indices_only() {
        let a = SparseVector::new(vec![3, 1, 7], vec![2.0, 1.0, 5.0]);
        let b = SparseVector::new(vec![1, 7, 9], vec![4.0, 2.0, 8.0]);
        // 1: 1*4, 7: 5*2
        assert_eq!(a.dot(&b), 14.0);
    }

    #[test]
    fn point_without_vectors_fails_validation() {
        let point = VectorPoint {
            id: Uuid::nil(),
            dense: None,
            sparse: None,
            payload: Map::new(),
        };
        assert!(point.validate().is_err());
        let ok = VectorPoint {
            id: Uuid::nil(),
            dense: Some(vec![0.0; 4]),
            sparse: None,
            payload: Map::new(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn language_extension_mapping_covers_grammar_languages() {
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("weird"), Language::Unknown);
        assert!(Language::Rust.has_grammar());
        assert!(!Language::Swift.has_grammar());
    }
}
